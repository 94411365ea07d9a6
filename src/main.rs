use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;

use gridbatch::api::submission_dto::SubmissionBatchDto;
use gridbatch::boot_server;
use gridbatch::domain::clock::WallClock;
use gridbatch::domain::exec_driver::ExecutionDriver;
use gridbatch::domain::hook::FnHook;
use gridbatch::domain::hook::event::HookEventKind;
use gridbatch::domain::server::{Server, ServerConfig};
use gridbatch::loader::parser::parse_json_file;
use gridbatch::logger;

/// Runs a batch of jobs and reservations through the lifecycle core, with a
/// demo end-of-job hook attached.
#[derive(Debug, Parser)]
#[command(name = "gridbatch")]
struct Args {
    /// Path to a submission batch (JSON with reservations and jobs).
    submissions: String,

    /// Optional server configuration file.
    #[arg(long)]
    config: Option<String>,

    /// Give up after this many wall-clock seconds.
    #[arg(long, default_value_t = 120)]
    max_wait: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let server = match &args.config {
        Some(path) => {
            let server = boot_server(path, WallClock::shared()).with_context(|| format!("booting from '{}'", path))?;
            Arc::new(server)
        }
        None => {
            logger::init();
            let config = ServerConfig { job_history_enable: true, ..ServerConfig::default() };
            Arc::new(Server::new(config, WallClock::shared()))
        }
    };

    // A demo auditing hook, imported the way an administrator would.
    server.create_hook("log_endjob", HookEventKind::EndJob, true)?;
    server.import_hook(
        "log_endjob",
        Arc::new(FnHook::new(|event| {
            event.log_job_msg(format!("endjob hook observed end at {}", event.job.end_time));
            event.accept();
        })),
    )?;

    let batch: SubmissionBatchDto =
        parse_json_file(&args.submissions).with_context(|| format!("loading submissions '{}'", args.submissions))?;

    for resv_dto in batch.reservations {
        let name = server.submit_reservation(resv_dto.into_submission())?;
        // The demo plays the carve-out collaborator too and confirms
        // everything right away.
        let queue = server.confirm_reservation(&name)?;
        println!("reservation {} confirmed on queue {}", name, queue);
    }

    let mut submitted = Vec::new();
    for job_dto in batch.jobs {
        let array_count = job_dto.array_count;
        let submission = job_dto.into_submission()?;
        match array_count {
            Some(count) if count > 0 => {
                let (parent, subjobs) = server.submit_array(submission, count)?;
                println!("array {} submitted with {} subjobs", parent, subjobs.len());
                submitted.push(parent);
                submitted.extend(subjobs);
            }
            _ => {
                let name = server.submit_job(submission)?;
                println!("job {} submitted", name);
                submitted.push(name);
            }
        }
    }

    let driver = ExecutionDriver::new(server.clone());
    let drained = driver.run_until_idle(args.max_wait).await;

    println!();
    if drained {
        println!("{}", "All jobs settled.".green().bold());
    } else {
        println!("{}", "Gave up with unsettled jobs.".red().bold());
    }

    let log = server.log();
    for name in &submitted {
        let state = server.job_state_code(name, true).map(|c| c.to_string()).unwrap_or_else(|_| "?".to_string());
        let hooks = log.match_count(name, "hook");
        println!("  {}  state {}  hook records {}", name.to_string().cyan(), state.bold(), hooks);
    }

    Ok(())
}
