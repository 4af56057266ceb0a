use crate::schema::{NormalizedTable, SchemaTag};

fn entity_fields(schema: SchemaTag) -> &'static [&'static str] {
    match schema {
        SchemaTag::V3 => &["named_entity"],
        SchemaTag::V4 => &["subject", "object"],
    }
}

/// Builds the entity list sent to the clustering prompt.
///
/// Without context the result is a JSON array of distinct entities. With
/// context every record contributes one line naming its relationship.
pub fn collect_named_entities(table: &NormalizedTable, with_context: bool) -> String {
    let fields = entity_fields(table.schema);

    if with_context {
        let mut out = String::new();
        for record in &table.records {
            let entities = fields
                .iter()
                .map(|field| record.value(field).trim())
                .filter(|value| !value.is_empty())
                .collect::<Vec<&str>>()
                .join(", ");
            if entities.is_empty() {
                continue;
            }
            out.push_str(&format!(
                "context: {} named entity: {}\n",
                record.detail().relationship,
                entities
            ));
        }
        return out;
    }

    let mut entities = Vec::<String>::new();
    for record in &table.records {
        for field in fields {
            for entity in record.value(field).split(',') {
                let entity = entity.trim();
                if !entity.is_empty() && !entities.iter().any(|seen| seen == entity) {
                    entities.push(entity.to_string());
                }
            }
        }
    }
    serde_json::Value::from(entities).to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::normalize;

    #[test]
    fn v3_entities_are_split_and_deduplicated() {
        let table = normalize(&json!([
            ["Explicit", "Intra", "rain -> flood", "", "rain, flood", "Rain caused a flood."],
            ["Explicit", "Intra", "flood -> damage", "", "flood,  damage ,", "The flood did damage."]
        ]))
        .unwrap();

        assert_eq!(
            collect_named_entities(&table, false),
            r#"["rain","flood","damage"]"#
        );
    }

    #[test]
    fn v4_context_lines_name_the_relationship() {
        let table = normalize(&json!([
            {"relationship": "heat -> drought", "subject": "heat", "object": "drought"},
            {"relationship": "none", "subject": "", "object": ""}
        ]))
        .unwrap();

        assert_eq!(
            collect_named_entities(&table, true),
            "context: heat -> drought named entity: heat, drought\n"
        );
    }

    #[test]
    fn empty_table_yields_empty_list() {
        let table = normalize(&json!([])).unwrap();
        assert_eq!(collect_named_entities(&table, false), "[]");
        assert_eq!(collect_named_entities(&table, true), "");
    }
}
