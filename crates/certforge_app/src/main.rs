use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use certforge_core::{DATA_EXTENSIONS, ForgeConfig, TEMPLATE_EXTENSIONS, check_upload, logging};
use certforge_docs::samples::{sample_recipients, sample_roster, sample_template};
use certforge_docs::{
    BatchGenerator, DocxTemplate, FieldMapping, ForgeError, ProcessingStamp, document_text,
    extract_records, generate_preview, inspect_placeholders, is_date_placeholder,
};

/// Fill DOCX certificate templates from spreadsheet rows.
#[derive(Parser, Debug)]
#[command(name = "certforge", version, arg_required_else_help = true)]
struct Cli {
    /// Config file to use instead of ~/.certforge/config.json.
    #[arg(long, global = true, env = "CERTFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the header row and record count of a data file.
    Headers {
        /// Spreadsheet or CSV file.
        source: PathBuf,
    },
    /// Print the placeholders a template uses.
    Placeholders {
        /// DOCX template.
        template: PathBuf,
    },
    /// Render a single record and print its text.
    Preview {
        #[command(flatten)]
        inputs: Inputs,

        /// Zero-based record index.
        #[arg(long, default_value_t = 0)]
        row: usize,

        /// Directory for the preview file (defaults to the configured preview dir).
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Render every record and package the certificates into a zip archive.
    Generate {
        #[command(flatten)]
        inputs: Inputs,

        /// Output directory (defaults to the configured output dir). Its files are replaced.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write a sample template, workbook and mapping to get started.
    Init {
        /// Directory to create the samples in (defaults to the configured upload dir).
        dir: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct Inputs {
    /// Spreadsheet or CSV file with one record per row. Relative names not
    /// found here are looked up in the upload dir, as are --template and --mapping.
    #[arg(long)]
    data: PathBuf,

    /// DOCX template.
    #[arg(long)]
    template: PathBuf,

    /// JSON file mapping placeholder names to column headers.
    #[arg(long)]
    mapping: Option<PathBuf>,

    /// Single `placeholder=Header` mapping; overrides entries from --mapping.
    #[arg(long = "map", value_name = "PLACEHOLDER=HEADER")]
    maps: Vec<String>,
}

impl Inputs {
    fn resolve(self, config: &ForgeConfig) -> Self {
        Self {
            data: config.resolve_upload(&self.data),
            template: config.resolve_upload(&self.template),
            mapping: self.mapping.map(|path| config.resolve_upload(&path)),
            maps: self.maps,
        }
    }

    fn validate(&self, config: &ForgeConfig) -> Result<()> {
        check_upload(&self.data, DATA_EXTENSIONS, config)?;
        check_upload(&self.template, TEMPLATE_EXTENSIONS, config)?;
        Ok(())
    }

    fn field_mapping(&self) -> Result<FieldMapping> {
        let mut mapping = match &self.mapping {
            Some(path) => FieldMapping::load(path)?,
            None => FieldMapping::new(),
        };
        for entry in &self.maps {
            let Some((placeholder, header)) = FieldMapping::parse_assignment(entry) else {
                bail!("Invalid --map entry '{entry}', expected PLACEHOLDER=HEADER");
            };
            mapping.insert(placeholder, header);
        }
        Ok(mapping)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            match e.downcast_ref::<ForgeError>() {
                Some(forge) => eprintln!("Error: {}\n  caused by: {e:#}", forge.user_message()),
                None => eprintln!("Error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => ForgeConfig::load_from_path(path)?,
        None => ForgeConfig::load()?,
    };
    if cli.verbose {
        config.log_level = "debug".into();
    }
    config.ensure_dirs()?;
    let _log_guard = logging::init_logging(&config)?;
    info!("Starting certforge v{}", env!("CARGO_PKG_VERSION"));

    // One timestamp per invocation: every record and the archive name share it.
    let stamp = ProcessingStamp::now();

    match cli.command {
        Command::Headers { source } => {
            let source = config.resolve_upload(&source);
            check_upload(&source, DATA_EXTENSIONS, &config)?;
            let dataset = extract_records(&source)?;
            for header in dataset.headers() {
                println!("{header}");
            }
            println!("({} records)", dataset.len());
        }
        Command::Placeholders { template } => {
            let template = config.resolve_upload(&template);
            check_upload(&template, TEMPLATE_EXTENSIONS, &config)?;
            for name in inspect_placeholders(&template)?.iter() {
                if is_date_placeholder(name) {
                    println!("{name}  [date]");
                } else {
                    println!("{name}");
                }
            }
        }
        Command::Preview { inputs, row, out } => {
            let inputs = inputs.resolve(&config);
            inputs.validate(&config)?;
            let mapping = inputs.field_mapping()?;
            let preview_dir = out.unwrap_or_else(|| config.preview_dir.clone());
            let path = generate_preview(
                &inputs.data,
                &inputs.template,
                &mapping,
                row,
                &preview_dir,
                stamp,
                config.normalize_mapped_dates,
            )?;
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read preview {}", path.display()))?;
            println!("{}", path.display());
            println!();
            println!("{}", document_text(&bytes)?);
        }
        Command::Generate { inputs, out } => {
            let inputs = inputs.resolve(&config);
            inputs.validate(&config)?;
            let mapping = inputs.field_mapping()?;
            let output_dir = out.unwrap_or_else(|| config.output_dir.clone());

            let dataset = extract_records(&inputs.data)?;
            let template = DocxTemplate::open(&inputs.template)?;
            let archive = BatchGenerator::new(&template, &mapping, stamp)
                .normalize_mapped_dates(config.normalize_mapped_dates)
                .run(&dataset, &output_dir)?;
            println!("{}", archive.path.display());
        }
        Command::Init { dir } => {
            let dir = dir.unwrap_or_else(|| config.upload_dir.clone());
            init_samples(&dir)?;
        }
    }

    Ok(())
}

fn init_samples(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let template = sample_template(&["name", "course", "completed_on", "completion_date"])?;
    let workbook = sample_roster(&sample_recipients())?;
    let mapping: FieldMapping = [
        ("name", "Name"),
        ("course", "Course"),
        ("completed_on", "Completed"),
    ]
    .into_iter()
    .collect();
    let mapping_json = mapping
        .to_json_pretty()
        .context("Failed to serialize mapping")?;

    let files = [
        ("template.docx", template),
        ("data.xlsx", workbook),
        ("mapping.json", mapping_json.into_bytes()),
    ];
    for (name, _) in &files {
        let path = dir.join(name);
        if path.exists() {
            bail!("Refusing to overwrite existing file: {}", path.display());
        }
    }
    for (name, bytes) in &files {
        let path = dir.join(name);
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{}", path.display());
    }
    Ok(())
}
