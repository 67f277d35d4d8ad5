//! Output renderers and formatting helpers for CLI commands.

use anyhow::anyhow;
use pgfront_api_models::{
    AppliedChanges, BucketView, CatalogView, ChunkedUploadSessionView, HealthView, ObjectView, RpcScalarResponse, SecretMetadataView,
    SettingView, SignedUrlResponse, SqlEditorResponse,
};

use crate::cli::OutputFormat;
use crate::client::{CliError, CliResult};

fn as_json<T: serde::Serialize>(value: &T) -> CliResult<String> {
    serde_json::to_string_pretty(value).map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))
}

pub(crate) fn render_settings(settings: &[SettingView], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", as_json(&settings)?),
        OutputFormat::Table => {
            println!("{:<32} {:>8} {:>9} VALUE", "KEY", "REV", "OVERRIDE");
            for setting in settings {
                println!(
                    "{:<32} {:>8} {:>9} {}",
                    setting.key,
                    setting.revision,
                    if setting.overridden { "env" } else { "-" },
                    setting.value
                );
            }
        }
    }
    Ok(())
}

pub(crate) fn render_secret_metadata(metadata: &SecretMetadataView, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", as_json(&metadata)?),
        OutputFormat::Table => {
            println!("key: {}", metadata.key);
            println!("set: {}", metadata.set);
            println!("overridden: {}", metadata.overridden);
        }
    }
    Ok(())
}

pub(crate) fn render_applied_changes(applied: &AppliedChanges, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", as_json(&applied)?),
        OutputFormat::Table => {
            println!("revision: {}", applied.revision);
            println!("changed keys: {}", applied.changed_keys.join(", "));
        }
    }
    Ok(())
}

pub(crate) fn render_catalog(catalog: &CatalogView, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", as_json(&catalog)?),
        OutputFormat::Table => {
            println!("catalog version: {}", catalog.version);
            println!("{:<24} {:<24} {:>6} {:<5} PK", "SCHEMA", "TABLE", "COLS", "RLS");
            for table in &catalog.tables {
                println!(
                    "{:<24} {:<24} {:>6} {:<5} {}",
                    table.schema,
                    table.name,
                    table.columns.len(),
                    if table.rls_enabled { "on" } else { "off" },
                    table.primary_key.join(",")
                );
            }
            if !catalog.functions.is_empty() {
                println!();
                println!("{:<24} {:<24} {:<12} RETURNS", "SCHEMA", "FUNCTION", "ARGS");
                for function in &catalog.functions {
                    println!(
                        "{:<24} {:<24} {:<12} {}{}",
                        function.schema,
                        function.name,
                        function.parameters.len(),
                        function.return_type,
                        if function.returns_set { " (set)" } else { "" }
                    );
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn render_sql_result(result: &SqlEditorResponse, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", as_json(&result)?),
        OutputFormat::Table => {
            for (index, statement) in result.results.iter().enumerate() {
                println!("-- statement {}: {}", index + 1, statement.statement);
                println!("rows affected: {}", statement.rows_affected);
                for row in &statement.rows {
                    println!("{row:?}");
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn render_rpc_result(response: &RpcScalarResponse, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", as_json(&response)?),
        OutputFormat::Table => println!("{}", response.result),
    }
    Ok(())
}

pub(crate) fn render_rows(rows: &serde_json::Value, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", as_json(&rows)?),
        OutputFormat::Table => {
            let Some(records) = rows.as_array() else {
                println!("{rows}");
                return Ok(());
            };
            for record in records {
                println!("{record}");
            }
            println!("{} row(s)", records.len());
        }
    }
    Ok(())
}

pub(crate) fn render_buckets(buckets: &[BucketView], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", as_json(&buckets)?),
        OutputFormat::Table => {
            println!("{:<24} {:<7} {:>12} MIME TYPES", "ID", "PUBLIC", "MAX SIZE");
            for bucket in buckets {
                println!(
                    "{:<24} {:<7} {:>12} {}",
                    bucket.id,
                    bucket.public,
                    bucket.max_file_size.map_or_else(|| "-".to_string(), |size| format_bytes(size.unsigned_abs())),
                    bucket.allowed_mime_types.join(",")
                );
            }
        }
    }
    Ok(())
}

pub(crate) fn render_object(object: &ObjectView, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", as_json(&object)?),
        OutputFormat::Table => {
            println!("bucket: {}", object.bucket_id);
            println!("path: {}", object.path);
            println!("size: {}", format_bytes(object.size.unsigned_abs()));
            if let Some(mime) = &object.mime_type {
                println!("mime type: {mime}");
            }
        }
    }
    Ok(())
}

pub(crate) fn render_signed_url(signed: &SignedUrlResponse, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", as_json(&signed)?),
        OutputFormat::Table => {
            println!("url: {}", signed.signed_url);
            println!("expires in: {}s", signed.expires_in);
        }
    }
    Ok(())
}

pub(crate) fn render_upload_session(session: &ChunkedUploadSessionView, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", as_json(&session)?),
        OutputFormat::Table => {
            println!("session: {}", session.session_id);
            println!("bucket/key: {}/{}", session.bucket, session.key);
            println!("status: {}", session.status);
            println!(
                "chunks: {}/{} complete",
                session.completed_chunks.len(),
                session.total_chunks
            );
            if !session.missing_chunks.is_empty() {
                println!("missing: {:?}", session.missing_chunks);
            }
        }
    }
    Ok(())
}

pub(crate) fn render_health(health: &HealthView, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", as_json(&health)?),
        OutputFormat::Table => {
            println!("status: {}", health.status);
            for check in &health.checks {
                println!("  {:<20} {}", check.name, if check.healthy { "healthy" } else { "unhealthy" });
            }
        }
    }
    Ok(())
}

#[must_use]
pub(crate) fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    let value = bytes_to_f64(bytes);
    if value >= GIB {
        format!("{:.2} GiB", value / GIB)
    } else if value >= MIB {
        format!("{:.2} MiB", value / MIB)
    } else if value >= KIB {
        format!("{:.2} KiB", value / KIB)
    } else {
        format!("{bytes} B")
    }
}

fn bytes_to_f64(value: u64) -> f64 {
    let high = u32::try_from(value >> 32).unwrap_or(u32::MAX);
    let low = u32::try_from(value & 0xFFFF_FFFF).unwrap_or(u32::MAX);
    f64::from(high) * 4_294_967_296.0 + f64::from(low)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_scales_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MiB");
    }
}
