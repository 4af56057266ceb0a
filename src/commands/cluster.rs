use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::info;

use crate::cli::ClusterArgs;
use crate::commands::generate::{
    UnparsableGeneration, build_generator, file_name_of, generate_json, read_attachments,
    write_unparsable,
};
use crate::commands::workspace::{Workspace, available_json_path, resolve_template};
use crate::entities::collect_named_entities;
use crate::generator::{FormatHint, GenerationRequest, Generator};
use crate::template::substitute;
use crate::util::{file_stamp, write_json_pretty};

pub const CLUSTER_FALLBACK_TEMPLATE: &str = "Group the following named entities into clusters of entities that refer to the same real-world concept. \
Return a JSON array of objects with a `cluster` name and a `members` list.\n{input}";

pub fn run(args: ClusterArgs) -> Result<()> {
    let workspace = Workspace::new(&args.data_root);
    let template = resolve_template(
        args.template.as_deref(),
        args.template_file.as_deref(),
        &workspace.cluster_template_path(),
        CLUSTER_FALLBACK_TEMPLATE,
    )?;
    let generator = build_generator(&args.generator)?;
    let attachments = read_attachments(&args.generator.attachments)?;

    let path = match cluster_file(
        &workspace,
        generator.as_ref(),
        &args.file,
        args.with_context,
        &template,
        ClusterModel {
            name: &args.model,
            attachments,
            enable_search: args.generator.enable_search,
        },
    ) {
        Ok(path) => path,
        Err(err) => {
            if let Some(unparsable) = err.downcast_ref::<UnparsableGeneration>() {
                write_unparsable(unparsable)?;
            }
            return Err(err);
        }
    };

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "{}", path.display())?;
    output.flush()?;
    Ok(())
}

pub struct ClusterModel<'a> {
    pub name: &'a str,
    pub attachments: Vec<Vec<u8>>,
    pub enable_search: bool,
}

pub fn cluster_file(
    workspace: &Workspace,
    generator: &dyn Generator,
    file_name: &str,
    with_context: bool,
    template: &str,
    model: ClusterModel<'_>,
) -> Result<PathBuf> {
    let table = workspace.read_table(file_name)?;
    if table.is_empty() {
        bail!("{file_name} has no rows to cluster");
    }
    let entities = collect_named_entities(&table, with_context);
    if entities.is_empty() || entities == "[]" {
        bail!("no named entities found in {file_name}");
    }

    info!(
        file = %file_name,
        schema = table.schema.as_str(),
        rows = table.len(),
        with_context,
        "requesting entity clustering"
    );

    let request = GenerationRequest {
        prompt: substitute(template, &entities),
        format: FormatHint::Json,
        model_name: model.name.to_string(),
        attachments: model.attachments,
        enable_search: model.enable_search,
    };
    let (recovered, _metadata) = generate_json(generator, &request)?;

    let source_stem = Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .context("output file name has no stem")?;
    let stem = format!("listwise_{}_{}", file_stamp(Utc::now()), source_stem);
    let path = available_json_path(&workspace.clusters_dir(), &stem);
    write_json_pretty(&path, &recovered.value)?;

    info!(
        path = %path.display(),
        file = %file_name_of(&path),
        recovery = recovered.strategy.as_str(),
        "stored entity clusters"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;

    use serde_json::{Value, json};

    use super::*;
    use crate::generator::{Generation, GeneratorError};

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: RefCell<Vec<String>>,
    }

    impl Generator for RecordingGenerator {
        fn generate(&self, request: &GenerationRequest) -> Result<Generation, GeneratorError> {
            self.prompts.borrow_mut().push(request.prompt.clone());
            Ok(Generation {
                text: r#"[{"cluster": "weather", "members": ["rain", "flood"]}]"#.to_string(),
                metadata: Value::Null,
            })
        }
    }

    fn model() -> ClusterModel<'static> {
        ClusterModel {
            name: "test-model",
            attachments: Vec::new(),
            enable_search: false,
        }
    }

    #[test]
    fn clusters_are_written_beside_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        write_json_pretty(
            &workspace.output_dir().join("response_1.json"),
            &json!([
                ["Explicit", "Intra", "rain -> flood", "", "rain, flood", "Rain caused a flood."]
            ]),
        )
        .unwrap();

        let generator = RecordingGenerator::default();
        let path = cluster_file(
            &workspace,
            &generator,
            "response_1.json",
            false,
            "Cluster these: {}",
            model(),
        )
        .unwrap();

        assert_eq!(
            generator.prompts.borrow().as_slice(),
            [r#"Cluster these: ["rain","flood"]"#]
        );
        assert!(path.starts_with(workspace.clusters_dir()));
        let name = file_name_of(&path);
        assert!(name.starts_with("listwise_"));
        assert!(name.ends_with("_response_1.json"));

        let written: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(written[0]["members"][1], "flood");
    }

    #[test]
    fn file_without_entities_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        write_json_pretty(&workspace.output_dir().join("empty.json"), &json!([])).unwrap();

        let generator = RecordingGenerator::default();
        assert!(
            cluster_file(&workspace, &generator, "empty.json", false, "{input}", model()).is_err()
        );
        assert!(generator.prompts.borrow().is_empty());
    }
}
