//! Command-line client for interacting with a pgfront server instance.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pgfront_api_models::{
    BucketCreateRequest, ChunkedUploadInitRequest, RpcRequest, SetupCompleteRequest, SetupStartRequest, SqlEditorRequest,
};
use pgfront_config::{ApiKeyPatch, SecretPatch, SettingPatch, SettingsChangeset};
use reqwest::{RequestBuilder, Url};
use serde_json::Value;
use tokio::time::sleep;
use uuid::Uuid;

use crate::client::{
    classify_problem, parse_api_key, parse_url, AppContext, CliDependencies, CliError, CliResult, HEADER_API_KEY, HEADER_LAST_EVENT_ID,
    HEADER_SETUP_TOKEN,
};
use crate::output::{
    render_applied_changes, render_buckets, render_catalog, render_health, render_object, render_rows, render_rpc_result,
    render_secret_metadata, render_settings, render_signed_url, render_sql_result, render_upload_session,
};

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";

/// Parses CLI arguments, executes the requested command, and handles
/// user-facing telemetry emission. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let command_name = command_label(&cli.command);
    let trace_id = Uuid::new_v4().to_string();
    let deps = match CliDependencies::from_env(&cli, &trace_id) {
        Ok(deps) => deps,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            return err.exit_code();
        }
    };
    let telemetry = deps.telemetry.clone();

    let result = dispatch(cli, &deps).await;

    let (exit_code, message, outcome) = match result {
        Ok(()) => (0, None, "success"),
        Err(err) => {
            let exit_code = err.exit_code();
            let message = err.display_message();
            eprintln!("error: {message}");
            (exit_code, Some(message), "error")
        }
    };

    if let Some(emitter) = &telemetry {
        emitter.emit(&trace_id, command_name, outcome, exit_code, message.as_deref()).await;
    }

    exit_code
}

async fn dispatch(cli: Cli, deps: &CliDependencies) -> CliResult<()> {
    let api_key = parse_api_key(cli.api_key)?;
    let format = cli.output;
    let ctx = AppContext {
        client: deps.client.clone(),
        base_url: cli.api_url,
        api_key,
    };

    match cli.command {
        Command::Setup(cmd) => match cmd {
            SetupCommand::Start(args) => handle_setup_start(&ctx, args).await,
            SetupCommand::Complete(args) => handle_setup_complete(&ctx, args).await,
        },
        Command::Settings(cmd) => match cmd {
            SettingsCommand::List => handle_settings_list(&ctx, format).await,
            SettingsCommand::Get(args) => handle_settings_get(&ctx, args, format).await,
            SettingsCommand::Set(args) => handle_settings_set(&ctx, args, format).await,
        },
        Command::Secrets(cmd) => match cmd {
            SecretsCommand::Get(args) => handle_secret_get(&ctx, args, format).await,
            SecretsCommand::Set(args) => handle_secret_set(&ctx, args, format).await,
            SecretsCommand::Delete(args) => handle_secret_delete(&ctx, args, format).await,
        },
        Command::Keys(cmd) => match cmd {
            KeysCommand::Upsert(args) => handle_key_upsert(&ctx, args, format).await,
            KeysCommand::Delete(args) => handle_key_delete(&ctx, args, format).await,
        },
        Command::Schema(cmd) => match cmd {
            SchemaCommand::Refresh => handle_schema_refresh(&ctx, format).await,
            SchemaCommand::Show => handle_schema_show(&ctx, format).await,
        },
        Command::Sql(args) => handle_sql(&ctx, args, format).await,
        Command::Rows(cmd) => match cmd {
            RowsCommand::List(args) => handle_rows_list(&ctx, args, format).await,
            RowsCommand::Get(args) => handle_rows_get(&ctx, args, format).await,
            RowsCommand::Create(args) => handle_rows_create(&ctx, args, format).await,
            RowsCommand::Update(args) => handle_rows_update(&ctx, args, format).await,
            RowsCommand::Delete(args) => handle_rows_delete(&ctx, args).await,
        },
        Command::Rpc(args) => handle_rpc(&ctx, args, format).await,
        Command::Storage(cmd) => match cmd {
            StorageCommand::Buckets(cmd) => match cmd {
                BucketsCommand::List => handle_buckets_list(&ctx, format).await,
                BucketsCommand::Create(args) => handle_bucket_create(&ctx, args, format).await,
                BucketsCommand::Delete(args) => handle_bucket_delete(&ctx, args).await,
            },
            StorageCommand::Sign(args) => handle_storage_sign(&ctx, args, format).await,
            StorageCommand::Get(args) => handle_storage_get(&ctx, args).await,
            StorageCommand::Put(args) => handle_storage_put(&ctx, args, format).await,
            StorageCommand::ChunkedInit(args) => handle_chunked_init(&ctx, args, format).await,
            StorageCommand::ChunkedStatus(args) => handle_chunked_status(&ctx, args, format).await,
            StorageCommand::ChunkedComplete(args) => handle_chunked_complete(&ctx, args, format).await,
            StorageCommand::ChunkedAbort(args) => handle_chunked_abort(&ctx, args).await,
        },
        Command::Events(args) => handle_tail(&ctx, "/admin/events", args).await,
        Command::Logs(args) => handle_tail(&ctx, "/admin/logs", args).await,
        Command::Health(args) => handle_health(&ctx, args, format).await,
    }
}

#[derive(Parser)]
#[command(name = "pgfront", about = "Administrative CLI for the pgfront platform")]
pub(crate) struct Cli {
    #[arg(long, global = true, env = "PGFRONT_API_URL", value_parser = parse_url, default_value = DEFAULT_API_URL)]
    api_url: Url,
    #[arg(long, global = true, env = "PGFRONT_API_KEY", help = "key_id:secret")]
    api_key: Option<String>,
    #[arg(long, global = true, env = "PGFRONT_HTTP_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub(crate) timeout: u64,
    #[arg(long = "output", alias = "format", global = true, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// First-boot setup token issuance and exchange.
    #[command(subcommand)]
    Setup(SetupCommand),
    /// Resolved setting values.
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Encrypted secret metadata and mutation.
    #[command(subcommand)]
    Secrets(SecretsCommand),
    /// Admin API key management.
    #[command(subcommand)]
    Keys(KeysCommand),
    /// Schema catalog introspection.
    #[command(subcommand)]
    Schema(SchemaCommand),
    /// Run raw SQL statements against the admin connection.
    Sql(SqlArgs),
    /// PostgREST-style row access on exposed tables and views.
    #[command(subcommand)]
    Rows(RowsCommand),
    /// Call an exposed SQL function.
    Rpc(RpcArgs),
    /// Object storage: buckets, objects, signed URLs, chunked uploads.
    #[command(subcommand)]
    Storage(StorageCommand),
    /// Tail the server-sent event stream.
    Events(TailArgs),
    /// Tail the structured log stream.
    Logs(TailArgs),
    /// Query process health.
    Health(HealthArgs),
}

#[derive(Subcommand)]
enum SetupCommand {
    Start(SetupStartArgs),
    Complete(SetupCompleteArgs),
}

#[derive(Args)]
struct SetupStartArgs {
    #[arg(long)]
    label: Option<String>,
}

#[derive(Args)]
struct SetupCompleteArgs {
    #[arg(long, env = "PGFRONT_SETUP_TOKEN")]
    token: String,
}

#[derive(Subcommand)]
enum SettingsCommand {
    List,
    Get(KeyArgs),
    Set(SettingSetArgs),
}

#[derive(Subcommand)]
enum SecretsCommand {
    Get(KeyArgs),
    Set(SecretSetArgs),
    Delete(KeyArgs),
}

#[derive(Subcommand)]
enum KeysCommand {
    Upsert(KeyUpsertArgs),
    Delete(KeyIdArgs),
}

#[derive(Subcommand)]
enum SchemaCommand {
    Refresh,
    Show,
}

#[derive(Subcommand)]
enum RowsCommand {
    List(RowsListArgs),
    Get(RowsGetArgs),
    Create(RowsBodyArgs),
    Update(RowsUpdateArgs),
    Delete(RowsGetArgs),
}

#[derive(Subcommand)]
enum StorageCommand {
    #[command(subcommand)]
    Buckets(BucketsCommand),
    Sign(StorageSignArgs),
    Get(StorageGetArgs),
    Put(StoragePutArgs),
    ChunkedInit(ChunkedInitArgs),
    ChunkedStatus(ChunkedSessionArgs),
    ChunkedComplete(ChunkedSessionArgs),
    ChunkedAbort(ChunkedSessionArgs),
}

#[derive(Subcommand)]
enum BucketsCommand {
    List,
    Create(BucketCreateArgs),
    Delete(KeyArgs),
}

#[derive(Args)]
struct KeyArgs {
    key: String,
}

#[derive(Args)]
struct SettingSetArgs {
    key: String,
    #[arg(help = "JSON value, or @path to read from a file")]
    value: String,
}

#[derive(Args)]
struct SecretSetArgs {
    name: String,
    #[arg(help = "Secret plaintext, or @path to read from a file")]
    value: String,
}

#[derive(Args)]
struct KeyIdArgs {
    key_id: String,
}

#[derive(Args)]
struct KeyUpsertArgs {
    #[arg(long)]
    key_id: Option<String>,
    #[arg(long)]
    label: Option<String>,
    #[arg(long)]
    enabled: Option<bool>,
    #[arg(long, help = "New plaintext secret; omit to leave unchanged")]
    secret: Option<String>,
    #[arg(long, help = "JSON rate limit payload")]
    rate_limit: Option<String>,
}

#[derive(Args)]
struct SqlArgs {
    #[arg(help = "One or more ';'-separated statements, or @path to read from a file")]
    statements: String,
}

#[derive(Args)]
struct RowsListArgs {
    table: String,
    #[arg(long = "filter", help = "Raw query parameter, e.g. id=eq.5 or select=col1,col2")]
    filters: Vec<String>,
}

#[derive(Args)]
struct RowsGetArgs {
    table: String,
    pk: String,
}

#[derive(Args)]
struct RowsBodyArgs {
    table: String,
    #[arg(help = "JSON object/array, or @path to read from a file")]
    body: String,
}

#[derive(Args)]
struct RowsUpdateArgs {
    table: String,
    pk: String,
    #[arg(help = "JSON object, or @path to read from a file")]
    body: String,
}

#[derive(Args)]
struct RpcArgs {
    name: String,
    #[arg(default_value = "{}", help = "JSON object of named arguments, or @path")]
    args: String,
}

#[derive(Args)]
struct BucketCreateArgs {
    id: String,
    #[arg(long)]
    public: bool,
    #[arg(long = "mime", value_delimiter = ',')]
    allowed_mime_types: Vec<String>,
    #[arg(long)]
    max_file_size: Option<i64>,
}

#[derive(Args)]
struct StorageSignArgs {
    bucket: String,
    path: String,
    #[arg(long, default_value = "GET")]
    method: String,
}

#[derive(Args)]
struct StorageGetArgs {
    bucket: String,
    path: String,
    #[arg(long, help = "Write to this file instead of stdout")]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct StoragePutArgs {
    bucket: String,
    path: String,
    #[arg(long, help = "Local file to upload")]
    file: PathBuf,
    #[arg(long)]
    mime: Option<String>,
}

#[derive(Args)]
struct ChunkedInitArgs {
    bucket: String,
    path: String,
    #[arg(long)]
    total_size: i64,
    #[arg(long)]
    chunk_size: i64,
}

#[derive(Args)]
struct ChunkedSessionArgs {
    bucket: String,
    session_id: Uuid,
}

#[derive(Args, Default)]
struct TailArgs {
    #[arg(long, value_delimiter = ',', help = "Filter to event kinds")]
    kind: Vec<String>,
    #[arg(long, help = "Persist Last-Event-ID to this file")]
    resume_file: Option<PathBuf>,
    #[arg(long, default_value_t = 5, help = "Seconds to wait before reconnecting")]
    retry_secs: u64,
}

#[derive(Args, Default)]
struct HealthArgs {
    #[arg(long, help = "Request the full per-dependency health report")]
    full: bool,
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
}

const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Setup(_) => "setup",
        Command::Settings(_) => "settings",
        Command::Secrets(_) => "secrets",
        Command::Keys(_) => "keys",
        Command::Schema(_) => "schema",
        Command::Sql(_) => "sql",
        Command::Rows(_) => "rows",
        Command::Rpc(_) => "rpc",
        Command::Storage(_) => "storage",
        Command::Events(_) => "events",
        Command::Logs(_) => "logs",
        Command::Health(_) => "health",
    }
}

fn with_api_key(builder: RequestBuilder, ctx: &AppContext) -> CliResult<RequestBuilder> {
    let creds = ctx
        .api_key
        .as_ref()
        .ok_or_else(|| CliError::validation("API key is required (pass --api-key or set PGFRONT_API_KEY)"))?;
    Ok(builder.header(HEADER_API_KEY, creds.header_value()))
}

fn join(ctx: &AppContext, path: &str) -> CliResult<Url> {
    ctx.base_url.join(path).map_err(|err| CliError::failure(anyhow!("invalid base URL: {err}")))
}

/// Reads the argument as a literal, or as file contents when it starts with `@`.
fn read_arg(raw: &str) -> CliResult<String> {
    if let Some(path) = raw.strip_prefix('@') {
        fs::read_to_string(path).map_err(|err| CliError::failure(anyhow!("failed to read '{path}': {err}")))
    } else {
        Ok(raw.to_string())
    }
}

fn parse_json_arg(raw: &str) -> CliResult<Value> {
    let text = read_arg(raw)?;
    serde_json::from_str(&text).map_err(|err| CliError::validation(format!("invalid JSON: {err}")))
}

async fn handle_setup_start(ctx: &AppContext, args: SetupStartArgs) -> CliResult<()> {
    let url = join(ctx, "/admin/setup/start")?;
    let response = ctx
        .client
        .post(url)
        .json(&SetupStartRequest { label: args.label })
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("setup start request failed: {err}")))?;

    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let text = response.text().await.map_err(|err| CliError::failure(anyhow!("failed to read response: {err}")))?;
    println!("{text}");
    Ok(())
}

async fn handle_setup_complete(ctx: &AppContext, args: SetupCompleteArgs) -> CliResult<()> {
    let url = join(ctx, "/admin/setup/complete")?;
    let response = ctx
        .client
        .post(url)
        .header(HEADER_SETUP_TOKEN, &args.token)
        .json(&SetupCompleteRequest { setup_token: args.token.clone() })
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("setup complete request failed: {err}")))?;

    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let text = response.text().await.map_err(|err| CliError::failure(anyhow!("failed to read response: {err}")))?;
    println!("{text}");
    Ok(())
}

async fn handle_settings_list(ctx: &AppContext, format: OutputFormat) -> CliResult<()> {
    let url = join(ctx, "/admin/settings")?;
    let response = with_api_key(ctx.client.get(url), ctx)?
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let settings = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_settings(&settings, format)
}

async fn handle_settings_get(ctx: &AppContext, args: KeyArgs, format: OutputFormat) -> CliResult<()> {
    let url = join(ctx, &format!("/admin/settings/{}", args.key))?;
    let response = with_api_key(ctx.client.get(url), ctx)?
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let setting = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_settings(std::slice::from_ref(&setting), format)
}

async fn apply_changeset(ctx: &AppContext, changeset: SettingsChangeset, format: OutputFormat) -> CliResult<()> {
    let url = join(ctx, "/admin/settings")?;
    let response = with_api_key(ctx.client.patch(url), ctx)?
        .json(&changeset)
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let applied = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_applied_changes(&applied, format)
}

async fn handle_settings_set(ctx: &AppContext, args: SettingSetArgs, format: OutputFormat) -> CliResult<()> {
    let value = parse_json_arg(&args.value)?;
    let changeset = SettingsChangeset {
        settings: vec![SettingPatch { key: args.key, value }],
        ..SettingsChangeset::default()
    };
    apply_changeset(ctx, changeset, format).await
}

async fn handle_secret_get(ctx: &AppContext, args: KeyArgs, format: OutputFormat) -> CliResult<()> {
    let url = join(ctx, &format!("/admin/secrets/{}", args.key))?;
    let response = with_api_key(ctx.client.get(url), ctx)?
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let metadata = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_secret_metadata(&metadata, format)
}

async fn handle_secret_set(ctx: &AppContext, args: SecretSetArgs, format: OutputFormat) -> CliResult<()> {
    let value = read_arg(&args.value)?;
    let changeset = SettingsChangeset {
        secrets: vec![SecretPatch::Set { name: args.name, value }],
        ..SettingsChangeset::default()
    };
    apply_changeset(ctx, changeset, format).await
}

async fn handle_secret_delete(ctx: &AppContext, args: KeyArgs, format: OutputFormat) -> CliResult<()> {
    let changeset = SettingsChangeset {
        secrets: vec![SecretPatch::Delete { name: args.key }],
        ..SettingsChangeset::default()
    };
    apply_changeset(ctx, changeset, format).await
}

async fn handle_key_upsert(ctx: &AppContext, args: KeyUpsertArgs, format: OutputFormat) -> CliResult<()> {
    let rate_limit = args.rate_limit.as_deref().map(parse_json_arg).transpose()?;
    let key_id = args.key_id.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
    let changeset = SettingsChangeset {
        api_keys: vec![ApiKeyPatch::Upsert {
            key_id,
            label: args.label,
            enabled: args.enabled,
            secret: args.secret,
            rate_limit,
        }],
        ..SettingsChangeset::default()
    };
    apply_changeset(ctx, changeset, format).await
}

async fn handle_key_delete(ctx: &AppContext, args: KeyIdArgs, format: OutputFormat) -> CliResult<()> {
    let changeset = SettingsChangeset {
        api_keys: vec![ApiKeyPatch::Delete { key_id: args.key_id }],
        ..SettingsChangeset::default()
    };
    apply_changeset(ctx, changeset, format).await
}

async fn handle_schema_refresh(ctx: &AppContext, format: OutputFormat) -> CliResult<()> {
    let url = join(ctx, "/admin/schema/refresh")?;
    let response = with_api_key(ctx.client.post(url), ctx)?
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let catalog = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_catalog(&catalog, format)
}

async fn handle_schema_show(ctx: &AppContext, format: OutputFormat) -> CliResult<()> {
    let url = join(ctx, "/.well-known/pgfront.json")?;
    let response = ctx
        .client
        .get(url)
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let catalog = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_catalog(&catalog, format)
}

async fn handle_sql(ctx: &AppContext, args: SqlArgs, format: OutputFormat) -> CliResult<()> {
    let statements = read_arg(&args.statements)?;
    let url = join(ctx, "/admin/sql")?;
    let response = with_api_key(ctx.client.post(url), ctx)?
        .json(&SqlEditorRequest { statements })
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let result = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_sql_result(&result, format)
}

async fn handle_rows_list(ctx: &AppContext, args: RowsListArgs, format: OutputFormat) -> CliResult<()> {
    let mut url = join(ctx, &format!("/{}", args.table))?;
    {
        let mut pairs = url.query_pairs_mut();
        for filter in &args.filters {
            if let Some((key, value)) = filter.split_once('=') {
                pairs.append_pair(key, value);
            } else {
                return Err(CliError::validation(format!("invalid filter '{filter}', expected key=value")));
            }
        }
    }
    let response = with_api_key(ctx.client.get(url), ctx)?
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let rows = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_rows(&rows, format)
}

async fn handle_rows_get(ctx: &AppContext, args: RowsGetArgs, format: OutputFormat) -> CliResult<()> {
    let url = join(ctx, &format!("/{}/{}", args.table, args.pk))?;
    let response = with_api_key(ctx.client.get(url), ctx)?
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let row = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_rows(&row, format)
}

async fn handle_rows_create(ctx: &AppContext, args: RowsBodyArgs, format: OutputFormat) -> CliResult<()> {
    let body = parse_json_arg(&args.body)?;
    let url = join(ctx, &format!("/{}", args.table))?;
    let response = with_api_key(ctx.client.post(url), ctx)?
        .json(&body)
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let rows = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_rows(&rows, format)
}

async fn handle_rows_update(ctx: &AppContext, args: RowsUpdateArgs, format: OutputFormat) -> CliResult<()> {
    let body = parse_json_arg(&args.body)?;
    let url = join(ctx, &format!("/{}/{}", args.table, args.pk))?;
    let response = with_api_key(ctx.client.patch(url), ctx)?
        .json(&body)
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let row = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_rows(&row, format)
}

async fn handle_rows_delete(ctx: &AppContext, args: RowsGetArgs) -> CliResult<()> {
    let url = join(ctx, &format!("/{}/{}", args.table, args.pk))?;
    let response = with_api_key(ctx.client.delete(url), ctx)?
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    println!("deleted {} {}", args.table, args.pk);
    Ok(())
}

async fn handle_rpc(ctx: &AppContext, args: RpcArgs, format: OutputFormat) -> CliResult<()> {
    let value = parse_json_arg(&args.args)?;
    let arguments = match value {
        Value::Object(map) => map.into_iter().collect(),
        other => return Err(CliError::validation(format!("rpc arguments must be a JSON object, got {other}"))),
    };
    let url = join(ctx, &format!("/rpc/{}", args.name))?;
    let response = with_api_key(ctx.client.post(url), ctx)?
        .json(&RpcRequest { arguments })
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let result = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_rpc_result(&result, format)
}

async fn handle_buckets_list(ctx: &AppContext, format: OutputFormat) -> CliResult<()> {
    let url = join(ctx, "/storage/buckets")?;
    let response = with_api_key(ctx.client.get(url), ctx)?
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let buckets = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_buckets(&buckets, format)
}

async fn handle_bucket_create(ctx: &AppContext, args: BucketCreateArgs, format: OutputFormat) -> CliResult<()> {
    let url = join(ctx, "/storage/buckets")?;
    let request = BucketCreateRequest {
        id: args.id,
        public: args.public,
        allowed_mime_types: args.allowed_mime_types,
        max_file_size: args.max_file_size,
    };
    let response = with_api_key(ctx.client.post(url), ctx)?
        .json(&request)
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let buckets = response
        .json()
        .await
        .map(|bucket| vec![bucket])
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_buckets(&buckets, format)
}

async fn handle_bucket_delete(ctx: &AppContext, args: KeyArgs) -> CliResult<()> {
    let url = join(ctx, &format!("/storage/buckets/{}", args.key))?;
    let response = with_api_key(ctx.client.delete(url), ctx)?
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    println!("deleted bucket {}", args.key);
    Ok(())
}

async fn handle_storage_sign(ctx: &AppContext, args: StorageSignArgs, format: OutputFormat) -> CliResult<()> {
    let mut url = join(ctx, &format!("/storage/sign/{}/{}", args.bucket, args.path))?;
    url.query_pairs_mut().append_pair("method", &args.method);
    let response = with_api_key(ctx.client.post(url), ctx)?
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let signed = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_signed_url(&signed, format)
}

async fn handle_storage_get(ctx: &AppContext, args: StorageGetArgs) -> CliResult<()> {
    let url = join(ctx, &format!("/storage/{}/{}", args.bucket, args.path))?;
    let response = with_api_key(ctx.client.get(url), ctx)?
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to read response body: {err}")))?;
    match args.out {
        Some(path) => {
            fs::write(&path, &bytes).map_err(|err| CliError::failure(anyhow!("failed to write '{}': {err}", path.display())))?;
            println!("wrote {} bytes to {}", bytes.len(), path.display());
        }
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(&bytes)
                .map_err(|err| CliError::failure(anyhow!("failed to write to stdout: {err}")))?;
        }
    }
    Ok(())
}

async fn handle_storage_put(ctx: &AppContext, args: StoragePutArgs, format: OutputFormat) -> CliResult<()> {
    let bytes = fs::read(&args.file).map_err(|err| CliError::failure(anyhow!("failed to read '{}': {err}", args.file.display())))?;
    let url = join(ctx, &format!("/storage/{}/{}", args.bucket, args.path))?;
    let mut builder = with_api_key(ctx.client.put(url), ctx)?.body(bytes);
    if let Some(mime) = &args.mime {
        builder = builder.header(reqwest::header::CONTENT_TYPE, mime);
    }
    let response = builder.send().await.map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let object = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_object(&object, format)
}

async fn handle_chunked_init(ctx: &AppContext, args: ChunkedInitArgs, format: OutputFormat) -> CliResult<()> {
    let url = join(ctx, &format!("/storage/{}/chunked", args.bucket))?;
    let request = ChunkedUploadInitRequest {
        path: args.path,
        total_size: args.total_size,
        chunk_size: args.chunk_size,
    };
    let response = with_api_key(ctx.client.post(url), ctx)?
        .json(&request)
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let session = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_upload_session(&session, format)
}

async fn handle_chunked_status(ctx: &AppContext, args: ChunkedSessionArgs, format: OutputFormat) -> CliResult<()> {
    let url = join(ctx, &format!("/storage/{}/chunked/{}", args.bucket, args.session_id))?;
    let response = with_api_key(ctx.client.get(url), ctx)?
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let session = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_upload_session(&session, format)
}

async fn handle_chunked_complete(ctx: &AppContext, args: ChunkedSessionArgs, format: OutputFormat) -> CliResult<()> {
    let url = join(ctx, &format!("/storage/{}/chunked/{}/complete", args.bucket, args.session_id))?;
    let response = with_api_key(ctx.client.post(url), ctx)?
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let object = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_object(&object, format)
}

async fn handle_chunked_abort(ctx: &AppContext, args: ChunkedSessionArgs) -> CliResult<()> {
    let url = join(ctx, &format!("/storage/{}/chunked/{}", args.bucket, args.session_id))?;
    let response = with_api_key(ctx.client.delete(url), ctx)?
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    println!("aborted upload session {}", args.session_id);
    Ok(())
}

async fn handle_health(ctx: &AppContext, args: HealthArgs, format: OutputFormat) -> CliResult<()> {
    let path = if args.full { "/health/full" } else { "/health" };
    let url = join(ctx, path)?;
    let response = ctx
        .client
        .get(url)
        .send()
        .await
        .map_err(|err| CliError::failure(anyhow!("request failed: {err}")))?;
    if !response.status().is_success() {
        return Err(classify_problem(response).await);
    }
    let health = response
        .json()
        .await
        .map_err(|err| CliError::failure(anyhow!("failed to decode response: {err}")))?;
    render_health(&health, format)
}

async fn handle_tail(ctx: &AppContext, path: &str, args: TailArgs) -> CliResult<()> {
    let mut resume_id = args
        .resume_file
        .as_ref()
        .and_then(|path| fs::read_to_string(path).ok())
        .and_then(|value| value.trim().parse::<u64>().ok());

    loop {
        let mut url = join(ctx, path)?;
        if !args.kind.is_empty() {
            url.query_pairs_mut().append_pair("kind", &args.kind.join(","));
        }

        let builder = with_api_key(ctx.client.get(url), ctx)?;
        let builder = if let Some(id) = resume_id { builder.header(HEADER_LAST_EVENT_ID, id.to_string()) } else { builder };

        let response = match builder.send().await {
            Ok(resp) => resp,
            Err(err) => {
                eprintln!("stream connection failed: {err:?}. retrying in {}s", args.retry_secs);
                sleep(Duration::from_secs(args.retry_secs)).await;
                continue;
            }
        };

        if !response.status().is_success() {
            return Err(classify_problem(response).await);
        }

        match stream_events(response, &args, resume_id.as_mut()).await {
            Ok(last_id) => resume_id = last_id,
            Err(err) => {
                eprintln!("stream error: {err:?}. retrying in {}s", args.retry_secs);
                sleep(Duration::from_secs(args.retry_secs)).await;
            }
        }
    }
}

async fn stream_events(response: reqwest::Response, args: &TailArgs, mut resume_slot: Option<&mut u64>) -> CliResult<Option<u64>> {
    use futures_util::StreamExt;

    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    let mut current_event_id: Option<u64> = None;
    let mut current_data = Vec::new();
    let mut last_seen = resume_slot.as_ref().map(|slot| **slot);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| CliError::failure(anyhow!("failed to read event stream: {err}")))?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].trim_end_matches('\r').to_string();
            buffer.drain(..=pos);
            if line.is_empty() {
                if current_data.is_empty() {
                    current_event_id = None;
                    continue;
                }
                let payload = current_data.join("\n");
                current_data.clear();
                if let Some(id) = current_event_id.take() {
                    if Some(id) == last_seen {
                        continue;
                    }
                    last_seen = Some(id);
                    if let Some(slot) = resume_slot.as_mut() {
                        **slot = id;
                    }
                    if let Some(path) = &args.resume_file {
                        let _ = fs::write(path, id.to_string());
                    }
                }
                println!("{payload}");
            } else if let Some(data) = line.strip_prefix("data:") {
                current_data.push(data.trim_start().to_string());
            } else if let Some(id) = line.strip_prefix("id:")
                && let Ok(value) = id.trim_start().parse::<u64>()
            {
                current_event_id = Some(value);
            }
        }
    }

    Ok(last_seen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_label_matches_variants() {
        let cli = Cli::parse_from(["pgfront", "schema", "show"]);
        assert_eq!(command_label(&cli.command), "schema");
    }

    #[test]
    fn read_arg_reads_literal_and_file() {
        assert_eq!(read_arg("hello").expect("literal"), "hello");
        let dir = std::env::temp_dir().join(format!("pgfront-cli-test-{}", std::process::id()));
        fs::write(&dir, "file contents").expect("write temp file");
        let result = read_arg(&format!("@{}", dir.display())).expect("read file");
        let _ = fs::remove_file(&dir);
        assert_eq!(result, "file contents");
    }

    #[test]
    fn parse_json_arg_rejects_invalid_json() {
        assert!(parse_json_arg("not json").is_err());
        assert_eq!(parse_json_arg(r#"{"a":1}"#).expect("valid json"), serde_json::json!({"a": 1}));
    }
}
