use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::cli::{GenerateArgs, GeneratorArgs};
use crate::commands::workspace::{Workspace, available_json_path, resolve_template};
use crate::error::CoreError;
use crate::generator::{
    CommandGenerator, FormatHint, Generation, GenerationRequest, Generator, ReplayGenerator,
};
use crate::genlog::{GenerationLog, NewGenerationLogEntry};
use crate::recovery::{Recovered, RecoveryStrategy, recover_json};
use crate::schema::{SchemaTag, normalize};
use crate::template::{FALLBACK_TEMPLATE, substitute};
use crate::util::{ensure_directory, file_stamp, now_utc_string, sha256_file, write_json_pretty};

/// The model answered, but nothing JSON-shaped could be recovered.
#[derive(Debug, Error)]
#[error("model output could not be parsed as JSON")]
pub struct UnparsableGeneration {
    pub raw: String,
    pub metadata: Value,
}

#[derive(Debug)]
pub struct StoredGeneration {
    pub path: PathBuf,
    pub value: Value,
    pub strategy: RecoveryStrategy,
    pub schema: Option<SchemaTag>,
    pub rows: usize,
    pub log_id: i64,
}

pub fn run(args: GenerateArgs) -> Result<()> {
    let workspace = Workspace::new(&args.data_root);
    let template = resolve_template(
        args.template.as_deref(),
        args.template_file.as_deref(),
        &workspace.extraction_template_path(),
        FALLBACK_TEMPLATE,
    )?;
    let input = match (&args.input, &args.input_file) {
        (Some(input), _) => input.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed to read input {}", path.display()))?,
        (None, None) => String::new(),
    };

    if template.trim().is_empty() {
        bail!("prompt template is empty");
    }
    if input.trim().is_empty() {
        bail!("an input text is required (--input or --input-file)");
    }

    let generator = build_generator(&args.generator)?;
    let request = GenerationRequest {
        prompt: substitute(&template, &input),
        format: FormatHint::Json,
        model_name: args.model.clone(),
        attachments: read_attachments(&args.generator.attachments)?,
        enable_search: args.generator.enable_search,
    };

    let stored = match store_generation(
        &workspace,
        generator.as_ref(),
        &request,
        &template,
        &input,
        args.keep_unsupported,
    ) {
        Ok(stored) => stored,
        Err(err) => {
            if let Some(unparsable) = err.downcast_ref::<UnparsableGeneration>() {
                write_unparsable(unparsable)?;
            }
            return Err(err);
        }
    };

    info!(
        path = %stored.path.display(),
        schema = stored.schema.map(SchemaTag::as_str).unwrap_or("unsupported"),
        rows = stored.rows,
        recovery = stored.strategy.as_str(),
        log_id = stored.log_id,
        "stored generation"
    );

    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, &stored.value)
        .context("failed to serialize generation output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

pub fn build_generator(args: &GeneratorArgs) -> Result<Box<dyn Generator>> {
    if let Some(path) = &args.replay {
        return Ok(Box::new(ReplayGenerator { path: path.clone() }));
    }
    if let Some(program) = &args.generator_command {
        return Ok(Box::new(CommandGenerator {
            program: program.clone(),
            args: args.generator_args.clone(),
            response_format: args.response_format,
        }));
    }
    bail!("no generator configured; pass --generator-command or --replay")
}

pub fn read_attachments(paths: &[PathBuf]) -> Result<Vec<Vec<u8>>> {
    paths
        .iter()
        .map(|path| {
            fs::read(path).with_context(|| format!("failed to read attachment {}", path.display()))
        })
        .collect()
}

/// Calls the generator and recovers JSON from its text.
pub fn generate_json(generator: &dyn Generator, request: &GenerationRequest) -> Result<(Recovered, Value)> {
    let Generation { text, metadata } = generator
        .generate(request)
        .context("generation request failed")?;

    match recover_json(&text) {
        Ok(recovered) => Ok((recovered, metadata)),
        Err(CoreError::UnparsableOutput { raw }) => Err(UnparsableGeneration { raw, metadata }.into()),
        Err(other) => Err(other.into()),
    }
}

/// Runs one extraction request end to end. Nothing is written unless the
/// output recovers and, without `keep_unsupported`, normalizes.
pub fn store_generation(
    workspace: &Workspace,
    generator: &dyn Generator,
    request: &GenerationRequest,
    template: &str,
    input: &str,
    keep_unsupported: bool,
) -> Result<StoredGeneration> {
    let (recovered, _metadata) = generate_json(generator, request)?;

    let (schema, rows) = match normalize(&recovered.value) {
        Ok(table) => (Some(table.schema), table.len()),
        Err(err) if keep_unsupported => {
            warn!(error = %err, "storing output that matches no extraction schema");
            (None, 0)
        }
        Err(err) => {
            return Err(anyhow::Error::new(err)
                .context("model output matches no extraction schema; rerun with --keep-unsupported to store it"));
        }
    };

    let log = GenerationLog::open(&workspace.log_path())?;
    let output_dir = workspace.output_dir();
    ensure_directory(&output_dir)?;
    let path = available_json_path(&output_dir, &format!("response_{}", file_stamp(Utc::now())));
    write_json_pretty(&path, &recovered.value)?;

    // An output file without its log row is removed.
    let logged = sha256_file(&path).and_then(|output_sha256| {
        log.append(&NewGenerationLogEntry {
            prompt_template: template,
            input,
            output_filename: &file_name_of(&path),
            output_sha256: &output_sha256,
            model_name: &request.model_name,
            created_at: &now_utc_string(),
        })
    });
    let log_id = match logged {
        Ok(log_id) => log_id,
        Err(err) => {
            if let Err(remove_err) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %remove_err, "failed to remove unlogged output");
            }
            return Err(err);
        }
    };

    Ok(StoredGeneration {
        path,
        value: recovered.value,
        strategy: recovered.strategy,
        schema,
        rows,
        log_id,
    })
}

pub fn write_unparsable(unparsable: &UnparsableGeneration) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "Raw model output:")?;
    writeln!(output, "{}", unparsable.raw)?;
    writeln!(output, "Response metadata:")?;
    serde_json::to_writer_pretty(&mut output, &unparsable.metadata)
        .context("failed to serialize response metadata")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}
