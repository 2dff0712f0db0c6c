//! Semantic validation for parsed pipeline configuration values.

use std::collections::HashSet;

use anyhow::{bail, Result};
use suitesync_source::identifier::validate_identifier;

use crate::config::types::{PipelineConfig, SourceConfig};

fn check_identifier(name: &str, context: &str, errors: &mut Vec<String>) {
    if let Err(reason) = validate_identifier(name) {
        errors.push(format!("{context}: {reason}"));
    }
}

/// Control table names may carry a schema prefix; each part is checked.
fn check_dotted(name: &str, context: &str, errors: &mut Vec<String>) {
    for part in name.split('.') {
        check_identifier(part, context, errors);
    }
}

fn validate_tables(config: &PipelineConfig, errors: &mut Vec<String>) {
    if config.tables.is_empty() {
        errors.push("At least one table must be configured".to_string());
    }

    let mut seen = HashSet::new();
    let mut targets = HashSet::new();
    for (i, table) in config.tables.iter().enumerate() {
        if table.name.trim().is_empty() {
            errors.push(format!("Table {i} has an empty name"));
            continue;
        }
        let ctx = format!("tables[{i}] '{}'", table.name);
        check_identifier(&table.name, &format!("{ctx} name"), errors);
        if !seen.insert(table.name.to_ascii_uppercase()) {
            errors.push(format!("Duplicate table name '{}'", table.name));
        } else if !targets.insert(table.target_name().to_ascii_uppercase()) {
            errors.push(format!(
                "Table '{}' writes to landing table '{}', which another table already uses",
                table.name,
                table.target_name()
            ));
        }
        if let Some(target) = &table.target {
            check_identifier(target, &format!("{ctx} target"), errors);
        }
        check_identifier(
            table.modified_column(),
            &format!("{ctx} modified_column"),
            errors,
        );
        if table.primary_key.is_empty() {
            errors.push(format!("Table '{}' has no primary_key", table.name));
        }
        for key in &table.primary_key {
            check_identifier(key, &format!("{ctx} primary_key"), errors);
        }
    }
}

fn validate_layers(config: &PipelineConfig, errors: &mut Vec<String>) {
    let layers = &config.layers;
    for (field, value) in [
        ("landing_db", &layers.landing_db),
        ("landing_schema", &layers.landing_schema),
        ("transient_schema", &layers.transient_schema),
        ("staging_db", &layers.staging_db),
        ("staging_schema", &layers.staging_schema),
        ("datamart_schema", &layers.datamart_schema),
    ] {
        check_identifier(value, &format!("layers.{field}"), errors);
    }
    if layers
        .landing_schema
        .eq_ignore_ascii_case(&layers.transient_schema)
    {
        errors.push("layers.transient_schema must differ from layers.landing_schema".to_string());
    }
}

fn validate_downstream(config: &PipelineConfig, errors: &mut Vec<String>) {
    check_identifier(
        &config.staging.change_column,
        "staging.change_column",
        errors,
    );
    for (i, seed) in config.staging.tables.iter().enumerate() {
        let ctx = format!("staging.tables[{i}]");
        check_identifier(&seed.source_table, &format!("{ctx}.source_table"), errors);
        check_identifier(&seed.source_view, &format!("{ctx}.source_view"), errors);
        check_identifier(&seed.target, &format!("{ctx}.target"), errors);
    }

    let dm = &config.datamart;
    check_identifier(&dm.merge_key, "datamart.merge_key", errors);
    check_identifier(&dm.audit_column, "datamart.audit_column", errors);
    for (i, view) in dm.views.iter().enumerate() {
        if view.source_view.trim().is_empty() || view.target.trim().is_empty() {
            errors.push(format!(
                "datamart.views[{i}] needs both source_view and target"
            ));
            continue;
        }
        check_identifier(&view.source_view, &format!("datamart.views[{i}].source_view"), errors);
        check_identifier(&view.target, &format!("datamart.views[{i}].target"), errors);
    }
}

/// Validate a parsed pipeline configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the config.
pub fn validate_pipeline(config: &PipelineConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported pipeline version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.environment.trim().is_empty() {
        errors.push("environment must not be empty".to_string());
    }

    if let SourceConfig::Postgres(pg) = &config.source {
        if let Some(schema) = &pg.schema {
            check_identifier(schema, "source.schema", &mut errors);
        }
    }

    check_dotted(
        &config.state.landing_control_table,
        "state.landing_control_table",
        &mut errors,
    );
    check_dotted(
        &config.state.staging_control_table,
        "state.staging_control_table",
        &mut errors,
    );

    validate_tables(config, &mut errors);
    validate_layers(config, &mut errors);
    validate_downstream(config, &mut errors);

    for (source_type, target_type) in &config.type_map {
        if source_type.trim().is_empty() || target_type.trim().is_empty() {
            errors.push(format!(
                "type_map entry '{source_type}: {target_type}' must not be empty"
            ));
        }
    }

    if !errors.is_empty() {
        bail!("Pipeline validation failed:\n  - {}", errors.join("\n  - "));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_pipeline_str;

    fn base_yaml(tables: &str) -> String {
        format!(
            r#"
version: "1.0"
environment: DEV_LANDING
source:
  kind: sqlite
  path: /tmp/netsuite.db
warehouse:
  kind: sqlite
  path: ":memory:"
tables:
{tables}
"#
        )
    }

    fn validate_yaml(yaml: &str) -> Result<()> {
        validate_pipeline(&parse_pipeline_str(yaml).unwrap())
    }

    #[test]
    fn test_valid_pipeline_passes() {
        let yaml = base_yaml("  - name: VENDORS\n    primary_key: VENDOR_ID");
        validate_yaml(&yaml).unwrap();
    }

    #[test]
    fn test_wrong_version_and_empty_environment() {
        let yaml = base_yaml("  - name: VENDORS\n    primary_key: VENDOR_ID")
            .replace("\"1.0\"", "\"2.0\"")
            .replace("DEV_LANDING", "\"\"");
        let err = validate_yaml(&yaml).unwrap_err().to_string();
        assert!(err.contains("Unsupported pipeline version '2.0'"));
        assert!(err.contains("environment must not be empty"));
    }

    #[test]
    fn test_empty_table_list_fails() {
        let err = validate_yaml(&base_yaml("  []")).unwrap_err().to_string();
        assert!(err.contains("At least one table"));
    }

    #[test]
    fn test_all_table_errors_reported_together() {
        let yaml = base_yaml(
            "  - name: VENDORS\n    primary_key: []\n  - name: vendors\n    primary_key: ID\n  - name: \"1BAD\"\n    primary_key: \"ID;DROP\"",
        );
        let err = validate_yaml(&yaml).unwrap_err().to_string();
        assert!(err.starts_with("Pipeline validation failed:"));
        assert!(err.contains("Table 'VENDORS' has no primary_key"));
        assert!(err.contains("Duplicate table name 'vendors'"));
        assert!(err.contains("must start with a letter or underscore"));
        assert!(err.contains("invalid character ';'"));
    }

    #[test]
    fn test_tables_sharing_a_target_fail() {
        let yaml = base_yaml(
            "  - name: VENDORS\n    primary_key: VENDOR_ID\n  - name: VENDORS_V2\n    target: vendors\n    primary_key: VENDOR_ID\n  - name: ITEMS\n    target: ITEM_DIM\n    primary_key: ITEM_ID",
        );
        let err = validate_yaml(&yaml).unwrap_err().to_string();
        assert!(
            err.contains("Table 'VENDORS_V2' writes to landing table 'vendors'"),
            "{err}"
        );
        assert!(!err.contains("ITEMS"));
    }

    #[test]
    fn test_dotted_control_table_accepted() {
        let mut yaml = base_yaml("  - name: VENDORS\n    primary_key: VENDOR_ID");
        yaml.push_str("state:\n  landing_control_table: PUBLIC.NETSUITE_CT\n");
        validate_yaml(&yaml).unwrap();
    }

    #[test]
    fn test_datamart_view_needs_both_names() {
        let mut yaml = base_yaml("  - name: VENDORS\n    primary_key: VENDOR_ID");
        yaml.push_str("datamart:\n  views:\n    - source_view: V_VENDOR\n      target: \"\"\n");
        let err = validate_yaml(&yaml).unwrap_err().to_string();
        assert!(err.contains("datamart.views[0] needs both source_view and target"));
    }

    #[test]
    fn test_transient_schema_must_differ() {
        let mut yaml = base_yaml("  - name: VENDORS\n    primary_key: VENDOR_ID");
        yaml.push_str("layers:\n  transient_schema: FINANCE\n");
        let err = validate_yaml(&yaml).unwrap_err().to_string();
        assert!(err.contains("transient_schema must differ"));
    }
}
