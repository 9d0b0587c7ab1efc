//! Subcommand handlers.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use metabridge_client::guard::validate_read_only;
use metabridge_client::{DatasetQueryRequest, ExportFormat, MetabaseClient, ReqwestTransport};
use secrecy::ExposeSecret;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Settings;
use crate::error::{CliError, Result};

/// Source of the query to run.
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Database id to run against
    #[arg(long)]
    pub database: u64,

    /// Native SQL; `-` reads it from stdin
    #[arg(long, conflicts_with = "mbql", required_unless_present = "mbql")]
    pub sql: Option<String>,

    /// MBQL query object as JSON
    #[arg(long)]
    pub mbql: Option<String>,

    /// Template tags for native SQL as a JSON object
    #[arg(long, requires = "sql")]
    pub template_tags: Option<String>,
}

impl QueryArgs {
    /// Builds the dataset request, reading stdin when `--sql -` is given.
    ///
    /// # Errors
    ///
    /// Returns an error if stdin cannot be read or a JSON argument is not an
    /// object.
    pub fn to_request(&self, stdin: impl Read) -> Result<DatasetQueryRequest> {
        if let Some(sql) = &self.sql {
            let sql = read_sql(sql, stdin)?;
            let mut request = DatasetQueryRequest::native(self.database, sql);
            if let Some(tags) = &self.template_tags {
                request = request.with_template_tags(parse_object("--template-tags", tags)?);
            }
            return Ok(request);
        }

        let mbql = self.mbql.as_deref().ok_or_else(|| {
            CliError::InvalidArgument("either --sql or --mbql is required".to_string())
        })?;
        Ok(DatasetQueryRequest::mbql(
            self.database,
            parse_object("--mbql", mbql)?,
        ))
    }
}

fn read_sql(sql: &str, mut stdin: impl Read) -> Result<String> {
    if sql == "-" {
        let mut buf = String::new();
        stdin.read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(sql.to_string())
    }
}

fn parse_object(flag: &str, raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(CliError::InvalidArgument(format!(
            "{flag} must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Builds a client from validated settings, logging in if needed.
///
/// # Errors
///
/// Returns an error if the transport cannot be built or authentication fails.
pub async fn connect(settings: &Settings, cancel: &CancellationToken) -> Result<MetabaseClient> {
    info!(
        metabase_url = %settings.metabase_url,
        api_key = settings.uses_api_key(),
        "connecting to Metabase"
    );
    let transport = Arc::new(ReqwestTransport::with_timeout(
        &settings.metabase_url,
        settings.timeout,
    )?);
    let client = MetabaseClient::with_transport(
        transport,
        settings.api_key.expose_secret(),
        &settings.username,
        settings.password.expose_secret(),
        cancel,
    )
    .await?;
    Ok(client)
}

/// `check`: run the health check, then print who we are.
///
/// # Errors
///
/// Returns the wrapped health check failure, a user lookup failure, or an
/// output error.
pub async fn check(
    client: &MetabaseClient,
    cancel: &CancellationToken,
    out: &mut impl Write,
) -> Result<()> {
    client.health_check(cancel).await?;
    let user = client.current_user(cancel).await?;
    info!(user_id = user.id, "metabase connection verified");
    writeln!(out, "{}", serde_json::to_string_pretty(&user)?)?;
    Ok(())
}

/// `validate`: run the read-only guard locally.
///
/// # Errors
///
/// Returns the guard rejection naming the blocked keyword.
pub fn validate(sql: &str, stdin: impl Read, out: &mut impl Write) -> Result<()> {
    let sql = read_sql(sql, stdin)?;
    validate_read_only(&sql)?;
    writeln!(out, "ok: query is read-only")?;
    Ok(())
}

/// `query`: execute and print the JSON response.
///
/// # Errors
///
/// Returns a guard, dispatch, or output error.
pub async fn query(
    client: &MetabaseClient,
    request: &DatasetQueryRequest,
    cancel: &CancellationToken,
    out: &mut impl Write,
) -> Result<()> {
    let response = client.execute_query(request, cancel).await?;
    info!(
        row_count = response.row_count,
        status = %response.status,
        "query completed"
    );
    writeln!(out, "{}", serde_json::to_string_pretty(&response)?)?;
    Ok(())
}

/// `export`: download results and write them to `output` or `out`.
///
/// # Errors
///
/// Returns a guard, dispatch, or write error.
pub async fn export(
    client: &MetabaseClient,
    request: &DatasetQueryRequest,
    format: ExportFormat,
    output: Option<&Path>,
    cancel: &CancellationToken,
    out: &mut impl Write,
) -> Result<()> {
    let bytes = client.export_query_results(request, format, cancel).await?;
    info!(format = %format, bytes = bytes.len(), "export completed");
    match output {
        Some(path) => tokio::fs::write(path, &bytes).await?,
        None => out.write_all(&bytes)?,
    }
    Ok(())
}

/// Arguments of the `export` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Download format: csv, json or xlsx
    #[arg(long, default_value = "csv")]
    pub format: ExportFormat,

    /// Write to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}
