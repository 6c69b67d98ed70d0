//! pcats - command-line client for the PCATS causal-inference service
//!
//! Submits GP/BART analyses described in TOML request files, waits for
//! the remote jobs and prints their results.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (connection, config, invalid request, etc.)
//!   2 - Job failed, timed out, or its result is not ready

mod cli;
mod config;

use anyhow::{Context, Result};
use cli::{Args, Command, OutputFormat};
use config::{Config, CONFIG_FILE};
use indicatif::{ProgressBar, ProgressStyle};
use pcats_client::data;
use pcats_client::report::{generate_json_report, generate_text_report, JobReport};
use pcats_client::{
    AnalysisRequest, CateRequest, ClientConfig, ClientError, Job, JobClient, JobId, PollPolicy,
    RequestFile, ValueList,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Example request written by `init-config --with-request`.
const REQUEST_FILE: &str = "request.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Initialize logging
    init_logging(&args);

    info!("pcats v{}", env!("CARGO_PKG_VERSION"));
    debug!("Command: {:?}", args.command);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);

            let client_error = e.chain().find_map(|c| c.downcast_ref::<ClientError>());
            if let Some(ClientError::Timeout { job_id, .. }) = client_error {
                eprintln!("   The job is still running. Resume with: pcats wait {}", job_id);
            }
            std::process::exit(client_error.map(ClientError::exit_code).unwrap_or(1));
        }
    }
}

/// Initialize logging based on verbosity settings.
///
/// Logs go to stderr so results on stdout stay machine-readable.
/// `RUST_LOG` overrides the level chosen by `--verbose` / `--quiet`.
fn init_logging(args: &Args) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(args.log_level()).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch a command. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    match args.command.clone() {
        Command::InitConfig { with_request } => handle_init_config(with_request),
        Command::FetchData { sources, dir } => {
            let config = load_config(&args)?;
            handle_fetch_data(&sources, &dir, &config, args.quiet).await
        }
        Command::Run { request } => Session::new(&args)?.run_request(&request).await,
        Command::Submit { request } => Session::new(&args)?.submit_request(&request).await,
        Command::Cate {
            job,
            x,
            control_tr,
            treat_tr,
            pr_values,
            no_wait,
        } => {
            let mut contrast =
                CateRequest::new(x, ValueList::parse(&control_tr), ValueList::parse(&treat_tr));
            if let Some(ref values) = pr_values {
                contrast = contrast.with_pr_values(ValueList::parse(values));
            }
            Session::new(&args)?.cate(&job, &contrast, no_wait).await
        }
        Command::Status { job } => Session::new(&args)?.status(&job).await,
        Command::Wait { job } => Session::new(&args)?.wait(&job).await,
        Command::Result { job } => Session::new(&args)?.result(&job).await,
    }
}

/// Handle init-config: generate a default .pcats.toml.
fn handle_init_config(with_request: bool) -> Result<i32> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        return Ok(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize the service URL, polling and output.");

    if with_request {
        let request_path = Path::new(REQUEST_FILE);
        if request_path.exists() {
            eprintln!("⚠️  {} already exists, not overwriting it.", REQUEST_FILE);
        } else {
            std::fs::write(request_path, RequestFile::example_toml())
                .with_context(|| format!("Failed to write {}", REQUEST_FILE))?;
            println!("✅ Created example {}. Try: pcats run {}", REQUEST_FILE, REQUEST_FILE);
        }
    }

    Ok(0)
}

/// Handle fetch-data: download data files into `dir`.
async fn handle_fetch_data(
    sources: &[String],
    dir: &Path,
    config: &Config,
    quiet: bool,
) -> Result<i32> {
    let mut items: Vec<(String, PathBuf)> = Vec::with_capacity(sources.len());
    for source in sources {
        let (url, file_name) = data::resolve_source(source)?;
        items.push((url, dir.join(file_name)));
    }

    if !quiet {
        println!("📥 Downloading {} file(s) into {}", items.len(), dir.display());
    }

    let http = data::download_client(Duration::from_secs(config.service.request_timeout_seconds))?;
    let sizes = data::download_all(&http, &items)
        .await
        .context("Failed to download data")?;

    if !quiet {
        for ((_, dest), bytes) in items.iter().zip(&sizes) {
            println!("     📄 {} ({} bytes)", dest.display(), bytes);
        }
        println!("\n✅ Download complete.");
    }
    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}

/// Everything a job command needs: client, polling policy and output settings.
struct Session {
    client: JobClient,
    policy: PollPolicy,
    format: OutputFormat,
    request_timeout: Duration,
    show_progress: bool,
    quiet: bool,
}

impl Session {
    fn new(args: &Args) -> Result<Self> {
        let mut config = load_config(args)?;
        config.merge_with_args(args);
        config.validate().context("Invalid settings")?;

        let client = JobClient::new(ClientConfig::from(&config.service))
            .context("Failed to create service client")?;
        debug!("Service: {}", client.base_url());

        Ok(Self {
            client,
            policy: PollPolicy::from(&config.polling),
            format: config.output.format,
            request_timeout: Duration::from_secs(config.service.request_timeout_seconds),
            show_progress: config.output.show_progress,
            quiet: args.quiet,
        })
    }

    /// Progress line on stderr, so stdout carries only results.
    fn note(&self, message: impl AsRef<str>) {
        if !self.quiet {
            eprintln!("{}", message.as_ref());
        }
    }

    fn emit(&self, report: &JobReport) -> Result<()> {
        let output = match self.format {
            OutputFormat::Text => generate_text_report(report),
            OutputFormat::Json => generate_json_report(report)?,
        };
        println!("{}", output.trim_end());
        Ok(())
    }

    /// Print a job id the way scripts expect it.
    fn emit_job_id(&self, job: &Job) -> Result<()> {
        match self.format {
            OutputFormat::Text => println!("JobID: {}", job.id()),
            OutputFormat::Json => println!("{}", serde_json::to_string(job)?),
        }
        Ok(())
    }

    fn load_request(&self, path: &Path) -> Result<RequestFile> {
        RequestFile::load(path)
            .with_context(|| format!("Failed to load request file: {}", path.display()))
    }

    /// Download data files the request lists under [download] but that are not on disk.
    async fn fetch_missing_data(
        &self,
        file: &RequestFile,
        analysis: &AnalysisRequest,
    ) -> Result<()> {
        let missing = file.missing_downloads(analysis);
        if !missing.is_empty() {
            self.note(format!("📥 Downloading {} data file(s)...", missing.len()));
            let http = data::download_client(self.request_timeout)?;
            data::download_all(&http, &missing)
                .await
                .context("Failed to download data")?;
        }
        Ok(())
    }

    async fn run_request(&self, path: &Path) -> Result<i32> {
        let file = self.load_request(path)?;
        let analysis = file.analysis()?;
        analysis.validate()?;
        self.fetch_missing_data(&file, &analysis).await?;

        self.note(format!("🚀 Submitting {} analysis...", analysis.kind()));
        let mut job = self.client.submit(&analysis).await?;
        self.note(format!("   Submitted job {}", job.id()));

        self.wait_with_progress(&mut job).await?;
        let result = self.client.fetch_result(&mut job).await?;
        self.emit(&JobReport::from_result(&job, &result, self.client.base_url()))?;

        for (i, contrast) in file.cate.iter().enumerate() {
            self.note(format!(
                "\n🔬 CATE follow-up {}/{} over {}",
                i + 1,
                file.cate.len(),
                contrast.x
            ));
            let mut child = self.client.submit_cate(&mut job, contrast).await?;
            self.note(format!("   Submitted job {}", child.id()));

            self.wait_with_progress(&mut child).await?;
            let result = self.client.fetch_result(&mut child).await?;
            self.emit(
                &JobReport::from_result(&child, &result, self.client.base_url())
                    .with_parent(job.id()),
            )?;
        }

        self.note("\n✅ Done.");
        Ok(0)
    }

    async fn submit_request(&self, path: &Path) -> Result<i32> {
        let file = self.load_request(path)?;
        let analysis = file.analysis()?;
        analysis.validate()?;
        self.fetch_missing_data(&file, &analysis).await?;

        let job = self.client.submit(&analysis).await?;
        self.emit_job_id(&job)?;
        if !file.cate.is_empty() {
            warn!(
                "{} [[cate]] follow-up(s) ignored by submit; use `pcats cate --job {}` once it is done",
                file.cate.len(),
                job.id()
            );
        }
        Ok(0)
    }

    async fn cate(&self, parent: &str, contrast: &CateRequest, no_wait: bool) -> Result<i32> {
        let mut parent = Job::attach(JobId::new(parent)?);
        let mut child = self.client.submit_cate(&mut parent, contrast).await?;

        if no_wait {
            self.emit_job_id(&child)?;
            return Ok(0);
        }

        self.note(format!("   Submitted job {}", child.id()));
        self.wait_with_progress(&mut child).await?;
        let result = self.client.fetch_result(&mut child).await?;
        self.emit(
            &JobReport::from_result(&child, &result, self.client.base_url())
                .with_parent(parent.id()),
        )?;
        Ok(0)
    }

    async fn status(&self, id: &str) -> Result<i32> {
        let mut job = Job::attach(JobId::new(id)?);
        let status = self.client.status(&mut job).await?;
        self.emit(&JobReport::from_status(&job, status, self.client.base_url()))?;
        Ok(0)
    }

    async fn wait(&self, id: &str) -> Result<i32> {
        let mut job = Job::attach(JobId::new(id)?);
        let status = self.wait_with_progress(&mut job).await?;
        self.emit(&JobReport::from_status(&job, status, self.client.base_url()))?;
        Ok(0)
    }

    async fn result(&self, id: &str) -> Result<i32> {
        let mut job = Job::attach(JobId::new(id)?);
        let result = self.client.fetch_result(&mut job).await?;
        self.emit(&JobReport::from_result(&job, &result, self.client.base_url()))?;
        Ok(0)
    }

    async fn wait_with_progress(&self, job: &mut Job) -> Result<pcats_client::JobStatus> {
        let spinner = if self.show_progress && !self.quiet {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_message(format!("⏳ Waiting for job {}", job.id()));
            pb.enable_steady_tick(Duration::from_millis(120));
            Some(pb)
        } else {
            None
        };

        let outcome = self.client.wait_for_result(job, &self.policy).await;

        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }
        Ok(outcome?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::any;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session(url: &str) -> Session {
        Session {
            client: JobClient::new(ClientConfig::default().with_url(url)).unwrap(),
            policy: PollPolicy::default(),
            format: OutputFormat::Text,
            request_timeout: Duration::from_secs(5),
            show_progress: false,
            quiet: true,
        }
    }

    #[tokio::test]
    async fn test_invalid_request_downloads_nothing() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string("Y,A,X\n1,0,2\n"))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let request = dir.path().join("request.toml");
        std::fs::write(
            &request,
            format!(
                "[static]\ndatafile = \"example1.csv\"\noutcome = \"Y\"\ntreatment = \"A\"\n\
                 x_explanatory = \"X\"\nx_confounding = \"X\"\nburn_num = 0\n\n\
                 [download]\ndatafile = \"{}/example1.csv\"\n",
                server.uri()
            ),
        )
        .unwrap();

        let session = session(&format!("{}/api", server.uri()));
        assert!(session.submit_request(&request).await.is_err());
        assert!(session.run_request(&request).await.is_err());

        assert!(server.received_requests().await.unwrap().is_empty());
        assert!(!dir.path().join("example1.csv").exists());
    }
}
