// src/sql.rs
//
// UNLOAD and COPY statements issued around the transform stage.

use crate::credential::AwsCredential;
use crate::error::{EtlError, Result};
use crate::run_descriptor::RunDescriptor;

/// Output columns, in the positional order the encoder writes them.
pub const OUTPUT_COLUMNS: [&str; 8] = [
    "query_job_id",
    "source_id",
    "full_name",
    "title",
    "first_name",
    "middle_name",
    "last_name",
    "suffix",
];

fn credential(run: &RunDescriptor) -> Result<&AwsCredential> {
    run.credential
        .as_ref()
        .ok_or_else(|| EtlError::config("storage credentials must be issued before rendering SQL"))
}

/// Quote a column identifier.
fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape a literal that is embedded in the single-quoted UNLOAD select.
fn nested_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Dump `id` and `full_name` (delimiter characters replaced by a space) to
/// `s3://bucket/source_prefix`.
pub fn unload_sql(run: &RunDescriptor) -> Result<String> {
    let cred = credential(run)?;
    let src = &run.source_table;
    let delimiter = nested_literal(&run.delimiter_char().to_string());
    Ok(format!(
        "UNLOAD('\n  SELECT\n    {pk} AS id,\n    REPLACE({name}, \\'{delimiter}\\', \\' \\') AS full_name\n  FROM {table}\n')\nTO 's3://{bucket}/{prefix}'\nWITH CREDENTIALS '{creds}'\nDELIMITER '{d}'\nGZIP;",
        pk = ident(src.primary_key()),
        name = ident(src.name_column()),
        table = src,
        bucket = run.bucket,
        prefix = run.source_prefix,
        creds = cred.redshift_credential_string(),
        d = run.delimiter_char(),
    ))
}

/// Load the eight output columns from `s3://bucket/destination_prefix`.
pub fn copy_sql(run: &RunDescriptor) -> Result<String> {
    let cred = credential(run)?;
    Ok(format!(
        "COPY {table} (\n    {columns}\n)\nFROM 's3://{bucket}/{prefix}'\nWITH CREDENTIALS '{creds}'\nDELIMITER '{d}'\nTRUNCATECOLUMNS\nGZIP\nEMPTYASNULL;",
        table = run.destination_table,
        columns = OUTPUT_COLUMNS.join(",\n    "),
        bucket = run.bucket,
        prefix = run.destination_prefix,
        creds = cred.redshift_credential_string(),
        d = run.delimiter_char(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{SourceTable, Table};

    fn run() -> RunDescriptor {
        let src = SourceTable::parse("\"crm\".\"people\"", "person_id", "display_name").unwrap();
        let dest = Table::new("crm", "parsed_names");
        let mut run = RunDescriptor::new(src, dest, "etl-bucket");
        run.credential = Some(AwsCredential::new("AKID", "SECRET", Some("TOKEN".into())));
        run
    }

    #[test]
    fn unload_selects_id_and_cleaned_name() {
        let r = run();
        let sql = unload_sql(&r).unwrap();
        assert!(sql.starts_with("UNLOAD('"));
        assert!(sql.contains("\"person_id\" AS id"));
        assert!(sql.contains("REPLACE(\"display_name\", \\'|\\', \\' \\') AS full_name"));
        assert!(sql.contains("FROM \"crm\".\"people\""));
        assert!(sql.contains(&format!("TO 's3://etl-bucket/{}'", r.source_prefix)));
        assert!(sql.contains("WITH CREDENTIALS 'aws_access_key_id=AKID;aws_secret_access_key=SECRET;token=TOKEN'"));
        assert!(sql.contains("DELIMITER '|'"));
        assert!(sql.trim_end().ends_with("GZIP;"));
    }

    #[test]
    fn copy_loads_eight_columns() {
        let r = run();
        let sql = copy_sql(&r).unwrap();
        assert!(sql.starts_with("COPY \"crm\".\"parsed_names\" ("));
        let cols: Vec<usize> = OUTPUT_COLUMNS.iter().map(|c| sql.find(c).unwrap()).collect();
        assert!(cols.windows(2).all(|w| w[0] < w[1]), "columns out of order");
        assert!(sql.contains(&format!("FROM 's3://etl-bucket/{}'", r.destination_prefix)));
        for clause in ["TRUNCATECOLUMNS", "GZIP", "EMPTYASNULL", "DELIMITER '|'"] {
            assert!(sql.contains(clause), "missing {clause}");
        }
    }

    #[test]
    fn requires_credential() {
        let mut r = run();
        r.credential = None;
        assert!(unload_sql(&r).is_err());
        assert!(copy_sql(&r).is_err());
    }
}
