use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

use lead_courier::compose::{compose_message, Greeting, TemplateError};
use lead_courier::config::{AppPaths, Settings};
use lead_courier::extract::{extract_leads_from_file, parse_bulk_leads, validate_manual_lead, SkipIncomplete};
use lead_courier::handoff::{whatsapp_link, write_fallback_files};
use lead_courier::logging::init_logging;
use lead_courier::pipeline::{spawn_pipeline, PipelineEvent};
use lead_courier::scrapers::SeleniumLookup;
use lead_courier::storage::{self, HistoryEntry};
use lead_courier::triage::{generate_leads_csv, generate_summary_md, summarize};
use lead_courier::Lead;

#[derive(Parser, Debug)]
#[command(name = "lead-courier")]
#[command(about = "Looks up auction-property leads and prepares WhatsApp messages for them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding config/ and data/ (defaults to the user data dir)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract leads from an e-mail dump and look each property up
    Process {
        /// Text file with the pasted e-mails (defaults to file_paths.leads_file)
        #[arg(short, long)]
        leads: Option<PathBuf>,

        /// Also process the manually added leads
        #[arg(long)]
        include_manual: bool,

        /// Show the browser window
        #[arg(long)]
        show_browser: bool,

        /// Where to write the summary report and CSV (defaults to data/)
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// Print the message and WhatsApp link for each processed lead
    Compose {
        /// Only the lead with this property code
        #[arg(long)]
        property_id: Option<String>,

        /// Write mensagem_<name>.txt/.html files into this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Fix the city of a processed lead after checking the listing
    SetCity {
        #[arg(long)]
        property_id: String,

        #[arg(long)]
        city: String,
    },

    /// Show, replace or reset the message templates
    Templates {
        #[command(subcommand)]
        action: TemplateCommands,
    },

    /// Add a lead by hand, or many from a pasted text file
    AddLead {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        property_id: Option<String>,

        /// Text file with several leads pasted from e-mails
        #[arg(long, conflicts_with_all = ["name", "email", "phone", "property_id"])]
        bulk: Option<PathBuf>,
    },

    /// List previous processing runs
    History,

    /// Write the default settings file
    InitConfig {
        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TemplateCommands {
    /// Print the current templates
    Show,

    /// Replace the templates with the contents of three files
    Set {
        #[arg(long)]
        normal: PathBuf,
        #[arg(long)]
        unavailable: PathBuf,
        #[arg(long)]
        pending: PathBuf,
    },

    /// Restore the built-in templates
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let paths = AppPaths::new(cli.root.clone().unwrap_or_else(AppPaths::default_root));
    paths.ensure_dirs()?;
    let mut settings = Settings::load(&paths.settings_file());

    match cli.command {
        Commands::Process { leads, include_manual, show_browser, report_dir } => {
            let leads_path = leads.unwrap_or_else(|| PathBuf::from(&settings.file_paths.leads_file));
            if show_browser {
                settings.processing.headless_mode = false;
            }
            let report_dir = report_dir.unwrap_or_else(|| paths.data_dir());
            run_process(&paths, settings, leads_path, include_manual, report_dir).await
        }
        Commands::Compose { property_id, out_dir } => run_compose(&paths, &settings, property_id, out_dir),
        Commands::SetCity { property_id, city } => run_set_city(&paths, &property_id, &city),
        Commands::Templates { action } => run_templates(&paths, settings, action),
        Commands::AddLead { name, email, phone, property_id, bulk } => {
            run_add_lead(&paths, name, email, phone, property_id, bulk)
        }
        Commands::History => run_history(&paths),
        Commands::InitConfig { force } => {
            let path = paths.settings_file();
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Settings::default().save(&path)?;
            println!("✅ Settings written to {}", path.display());
            Ok(())
        }
    }
}

async fn run_process(
    paths: &AppPaths,
    settings: Settings,
    leads_path: PathBuf,
    include_manual: bool,
    report_dir: PathBuf,
) -> Result<()> {
    let mut leads = extract_leads_from_file(&leads_path, &mut SkipIncomplete);
    if include_manual {
        let manual = storage::load_manual_leads(&paths.manual_leads_file())?;
        info!("Adding {} manual leads", manual.len());
        leads.extend(manual);
    }
    if leads.is_empty() {
        bail!("No leads found in {}", leads_path.display());
    }
    println!("📋 {} leads to process", leads.len());

    let site = settings.site.clone();
    let processing = settings.processing.clone();
    let mut handle = spawn_pipeline(
        async move { SeleniumLookup::connect(&site, &processing).await },
        leads,
        settings.clone(),
    );

    let stop = handle.stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n⚠️  Stop requested, finishing the current lead...");
            stop.stop();
        }
    });

    let mut setup_failed = None;
    while let Some(event) = handle.events.recv().await {
        match event {
            PipelineEvent::Log(_) => {}
            PipelineEvent::Progress { current, total } => println!("[{}/{}]", current, total),
            PipelineEvent::Lead(lead) => {
                println!("  {} ({}) -> {} | {}", lead.name, lead.property_id, lead.status.label(), lead.city_display())
            }
            PipelineEvent::Finished(_) => {}
            PipelineEvent::Error(message) => setup_failed = Some(message),
        }
    }

    let leads = handle.task.await.context("Pipeline task failed")?;
    if let Some(message) = setup_failed {
        error!("{}", message);
        bail!(message);
    }

    storage::save_processed_leads(&paths.processed_leads_file(), &leads)?;

    let stats = summarize(&leads);
    let source = leads_path.display().to_string();
    if let Err(e) = storage::append_history(
        &paths.history_file(),
        HistoryEntry::new(&source, stats.clone()),
        settings.processing.max_history_entries,
    ) {
        warn!("Failed to save history: {:#}", e);
    }

    fs::create_dir_all(&report_dir).with_context(|| format!("Failed to create {:?}", report_dir))?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let md_path = report_dir.join(format!("resumo_{}.md", stamp));
    let csv_path = report_dir.join(format!("leads_{}.csv", stamp));
    fs::write(&md_path, generate_summary_md(&leads, &stats, &source))
        .with_context(|| format!("Failed to write {:?}", md_path))?;
    fs::write(&csv_path, generate_leads_csv(&leads)).with_context(|| format!("Failed to write {:?}", csv_path))?;

    println!();
    println!("✅ Completos: {}", stats.complete);
    println!("⚠️  Revisão manual: {}", stats.pending_review);
    println!("⚠️  Indisponíveis: {}", stats.unavailable);
    println!("❌ Erros: {}", stats.errors);
    if stats.not_processed > 0 {
        println!("⏹  Não processados: {}", stats.not_processed);
    }
    println!("📄 Relatório: {}", md_path.display());
    Ok(())
}

fn run_compose(
    paths: &AppPaths,
    settings: &Settings,
    property_id: Option<String>,
    out_dir: Option<PathBuf>,
) -> Result<()> {
    let leads = storage::load_processed_leads(&paths.processed_leads_file())?;
    let selected: Vec<&Lead> = leads
        .iter()
        .filter(|l| property_id.as_deref().map_or(true, |id| l.property_id == id))
        .collect();
    if selected.is_empty() {
        bail!("No processed leads to compose (run `process` first)");
    }

    let out_dir = out_dir.or_else(|| {
        settings
            .whatsapp
            .write_fallback_files
            .then(|| paths.data_dir().join("mensagens"))
    });
    let greeting = Greeting::now();

    for lead in selected {
        let message = match compose_message(lead, &settings.message_templates, greeting) {
            Ok(message) => message,
            Err(TemplateError::NotReady(_)) => {
                println!("⏭  {} ({}): not processed yet", lead.name, lead.property_id);
                continue;
            }
            Err(e) => {
                warn!("{}: {}", lead.name, e);
                continue;
            }
        };
        let link = whatsapp_link(lead, &message, &settings.whatsapp);

        println!("===== {} ({}) =====", lead.name, lead.status.label());
        println!("{}", message);
        println!("🔗 {}", link);
        if let Some(dir) = &out_dir {
            write_fallback_files(dir, lead, &message, &link)?;
        }
        println!();
    }
    Ok(())
}

fn run_set_city(paths: &AppPaths, property_id: &str, city: &str) -> Result<()> {
    let path = paths.processed_leads_file();
    let mut leads = storage::load_processed_leads(&path)?;
    let mut updated = 0;
    for lead in leads.iter_mut().filter(|l| l.property_id == property_id) {
        lead.set_city_manually(city);
        updated += 1;
    }
    if updated == 0 {
        bail!("No processed lead with property code {}", property_id);
    }
    storage::save_processed_leads(&path, &leads)?;
    println!("✅ City set to {} for {} lead(s)", city.trim(), updated);
    Ok(())
}

fn run_templates(paths: &AppPaths, mut settings: Settings, action: TemplateCommands) -> Result<()> {
    match action {
        TemplateCommands::Show => {
            let templates = &settings.message_templates;
            println!("--- normal ---\n{}\n", templates.normal_lead);
            println!("--- unavailable ---\n{}\n", templates.unavailable_lead);
            println!("--- pending review ---\n{}", templates.pending_review_lead);
            return Ok(());
        }
        TemplateCommands::Set { normal, unavailable, pending } => {
            let read = |path: &PathBuf| {
                fs::read_to_string(path).with_context(|| format!("Failed to read template {:?}", path))
            };
            settings.set_templates(&read(&normal)?, &read(&unavailable)?, &read(&pending)?)?;
        }
        TemplateCommands::Reset => settings.reset_templates(),
    }
    settings.save(&paths.settings_file())?;
    println!("✅ Templates saved");
    Ok(())
}

fn run_add_lead(
    paths: &AppPaths,
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    property_id: Option<String>,
    bulk: Option<PathBuf>,
) -> Result<()> {
    let path = paths.manual_leads_file();
    let mut manual = storage::load_manual_leads(&path)?;

    if let Some(bulk) = bulk {
        let text = fs::read_to_string(&bulk).with_context(|| format!("Failed to read {:?}", bulk))?;
        let result = parse_bulk_leads(&text, &manual);
        for problem in &result.problems {
            println!("⚠️  {}", problem);
        }
        println!("✅ {} leads added", result.accepted.len());
        manual.extend(result.accepted);
    } else {
        let lead = validate_manual_lead(
            name.as_deref().unwrap_or(""),
            email.as_deref().unwrap_or(""),
            phone.as_deref().unwrap_or(""),
            property_id.as_deref().unwrap_or(""),
        )?;
        if manual.iter().any(|l| l.email == lead.email) {
            bail!("A lead with e-mail {} was already added", lead.email.as_deref().unwrap_or(""));
        }
        println!("✅ {} added", lead.name);
        manual.push(lead);
    }

    storage::save_manual_leads(&path, &manual)
}

fn run_history(paths: &AppPaths) -> Result<()> {
    let history = storage::load_history(&paths.history_file())?;
    if history.is_empty() {
        println!("No processing history yet");
        return Ok(());
    }
    for entry in history.iter().rev() {
        println!(
            "{}  {}  total={} completos={} revisão={} indisponíveis={} erros={} ({:.1}%)",
            entry.timestamp,
            entry.source_file,
            entry.stats.total,
            entry.stats.complete,
            entry.stats.pending_review,
            entry.stats.unavailable,
            entry.stats.errors,
            entry.stats.success_rate()
        );
    }
    Ok(())
}
