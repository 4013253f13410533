use std::fs::File;
use std::io::{self, BufWriter};
use std::process::ExitCode;

use anyhow::Context;
use colored::Colorize;
use tel_ledger::{AnomalyKind, AuditLedger, EntryFilter, VerificationResult};
use tel_server::{ServerConfig, TelServer};
use tel_store::FileLedgerStore;
use tel_types::{Actor, AuditEvent, LedgerEntry, OrganizationId, Payload, Resource};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(&cli)?;
    let Cli {
        command, format, org, ..
    } = cli;
    let open = || open_ledger(&org, &config);

    match command {
        Command::Serve(args) => cmd_serve(&config, args),
        Command::Append(args) => cmd_append(&open()?, args, format),
        Command::Show(args) => cmd_show(&open()?, args, format),
        Command::Log(args) => cmd_log(&open()?, args, format),
        Command::Head => cmd_head(&open()?, format),
        Command::Verify(args) => cmd_verify(&open()?, args, format),
        Command::Export(args) => cmd_export(&open()?, args),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.ledger.data_dir = dir.clone();
    }
    Ok(config)
}

fn open_ledger(
    org: &OrganizationId,
    config: &ServerConfig,
) -> anyhow::Result<AuditLedger<FileLedgerStore>> {
    let path = config.ledger.segment_path(org);
    let ledger = AuditLedger::open(&path, &config.ledger)
        .with_context(|| format!("opening ledger {}", path.display()))?;
    let report = ledger.store().recovery_report();
    if !report.is_clean() {
        eprintln!(
            "{} {} record(s) skipped, {} byte(s) truncated while loading {}",
            "warning:".yellow().bold(),
            report.skipped.len(),
            report.truncated_bytes,
            path.display()
        );
    }
    Ok(ledger)
}

fn cmd_append(
    ledger: &AuditLedger<FileLedgerStore>,
    args: AppendArgs,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let payload: Payload = match &args.payload {
        Some(text) => serde_json::from_str(text).context("--payload must be a JSON object")?,
        None => Payload::new(),
    };
    let event = AuditEvent::new(
        args.event_type,
        Actor::new(args.actor_type, args.actor_id),
        Resource::new(args.resource_type, args.resource_id),
    )
    .with_payload(payload);

    let entry = ledger.append(event)?;
    match format {
        OutputFormat::Json => print_json(&entry)?,
        OutputFormat::Text => {
            println!(
                "{} Recorded entry {}",
                "✓".green().bold(),
                format!("#{}", entry.sequence_number).yellow()
            );
            println!("  Hash: {}", entry.entry_hash.to_hex().cyan());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_show(
    ledger: &AuditLedger<FileLedgerStore>,
    args: ShowArgs,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let Some(entry) = ledger.get_entry(args.sequence)? else {
        eprintln!("{} no entry #{}", "error:".red().bold(), args.sequence);
        return Ok(ExitCode::FAILURE);
    };
    match format {
        OutputFormat::Json => print_json(&entry)?,
        OutputFormat::Text => {
            print_entry_line(&entry);
            println!("  Timestamp: {}", entry.timestamp.to_rfc3339());
            println!("  Hash:      {}", entry.entry_hash.to_hex().cyan());
            println!("  Previous:  {}", entry.previous_hash.to_hex().dimmed());
            if !entry.payload.is_empty() {
                println!("  Payload:   {}", serde_json::to_value(&entry.payload)?);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_log(
    ledger: &AuditLedger<FileLedgerStore>,
    args: LogArgs,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let filter = EntryFilter {
        event_type: args.event_type.map(Into::into),
        actor_id: args.actor_id,
        resource_id: args.resource_id,
        ..EntryFilter::default()
    };
    let entries = ledger.query(args.start, args.end.unwrap_or(u64::MAX), &filter, args.limit)?;
    match format {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Text if entries.is_empty() => println!("No entries."),
        OutputFormat::Text => entries.iter().for_each(print_entry_line),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_head(ledger: &AuditLedger<FileLedgerStore>, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let head = ledger.head()?;
    match (format, head) {
        (OutputFormat::Json, head) => print_json(&head)?,
        (OutputFormat::Text, None) => println!("Ledger is empty."),
        (OutputFormat::Text, Some(tip)) => println!(
            "{} {}",
            format!("#{}", tip.latest_sequence_number).yellow().bold(),
            tip.latest_hash.to_hex().cyan()
        ),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_verify(
    ledger: &AuditLedger<FileLedgerStore>,
    args: VerifyArgs,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let result = match (args.from, args.previous_hash) {
        (Some(from), Some(hash)) => ledger.incremental_verify(from, hash)?,
        _ => ledger.full_verify()?,
    };
    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print_verification(&result),
    }
    Ok(if result.is_valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_export(ledger: &AuditLedger<FileLedgerStore>, args: ExportArgs) -> anyhow::Result<ExitCode> {
    let end = args.end.unwrap_or(u64::MAX);
    let written = match &args.output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            let written = ledger.export_jsonl(&mut BufWriter::new(file), args.start, end)?;
            eprintln!("{} Exported {} entries to {}", "✓".green().bold(), written, path.display());
            written
        }
        None => ledger.export_jsonl(&mut io::stdout().lock(), args.start, end)?,
    };
    tracing::debug!(written, "export finished");
    Ok(ExitCode::SUCCESS)
}

fn cmd_serve(config: &ServerConfig, args: ServeArgs) -> anyhow::Result<ExitCode> {
    let mut config = config.clone();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    println!(
        "tel server on {} (data: {})",
        config.bind_addr.to_string().bold(),
        config.ledger.data_dir.display()
    );
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(TelServer::file_backed(config).serve())?;
    Ok(ExitCode::SUCCESS)
}

fn print_entry_line(entry: &LedgerEntry) {
    println!(
        "{}  {}  {}  {} {}  {}",
        format!("#{}", entry.sequence_number).yellow().bold(),
        entry.entry_hash.short_hex().dimmed(),
        entry.event_type.as_str().green(),
        entry.actor,
        "→".dimmed(),
        entry.resource
    );
}

fn print_verification(result: &VerificationResult) {
    if result.is_valid {
        println!("{} Chain integrity verified", "✓".green().bold());
    } else {
        println!(
            "{} {} anomal{} found",
            "✗".red().bold(),
            result.anomalies.len(),
            if result.anomalies.len() == 1 { "y" } else { "ies" }
        );
    }
    println!(
        "  Entries checked: {} (from #{})",
        result.entries_checked.to_string().bold(),
        result.from_sequence
    );
    if let Some(cp) = &result.checkpoint {
        println!(
            "  Checkpoint: #{} {}",
            cp.latest_sequence_number,
            cp.latest_hash.to_hex().cyan()
        );
    }
    for anomaly in &result.anomalies {
        let kind = match anomaly.kind {
            AnomalyKind::HashMismatch => "hash_mismatch".red(),
            AnomalyKind::SequenceGap => "sequence_gap".magenta(),
            AnomalyKind::BrokenLink => "broken_link".yellow(),
        };
        println!("  #{:<6} {}", anomaly.sequence_number, kind);
        println!("     expected {}", anomaly.expected.dimmed());
        println!("     actual   {}", anomaly.actual);
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
