use crate::api::server as api_server;
use crate::cli::opts::*;

use anyhow::{anyhow, Result};
use lifeos_core::{
    AccessControl, CardEntry, CardStore, Grade, ReviewService, ServiceConfig, SystemClock, UserId,
};
use lifeos_json::paths::data_root;
use lifeos_json::JsonStore;
use lifeos_sqlite::SqliteRepo;
use std::io::{stdin, stdout, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct Backend {
    pub store: Arc<dyn CardStore>,
    pub access: Arc<dyn AccessControl>,
}

pub async fn run_cli(args: Cli) -> Result<()> {
    let backend = open_backend(&args.store, args.data_dir.as_deref(), args.db_path.clone()).await?;
    let service = ReviewService::new(
        backend.store.clone(),
        backend.access.clone(),
        Arc::new(SystemClock),
        ServiceConfig {
            max_conflict_retries: args.max_retries,
        },
    );

    match args.cmd.clone() {
        Command::Api(api) => {
            let addr: std::net::SocketAddr = api.addr.parse()?;
            api_server::run(service, addr).await
        }
        Command::Project(cmd) => project_cmd(&backend, require_user(&args)?, cmd).await,
        Command::Card(cmd) => card_cmd(&service, require_user(&args)?, cmd).await,
        Command::Review(cmd) => review_cmd(&service, require_user(&args)?, cmd).await,
        Command::Stats(cmd) => stats_cmd(&service, require_user(&args)?, cmd).await,
        Command::Export(cmd) => export_cmd(&service, require_user(&args)?, cmd).await,
    }
}

pub async fn open_backend(
    store: &StoreKind,
    data_dir: Option<&Path>,
    db_path: Option<PathBuf>,
) -> Result<Backend> {
    match store {
        StoreKind::Json => {
            let s = Arc::new(JsonStore::open_in(data_dir).await?);
            Ok(Backend {
                store: s.clone(),
                access: s,
            })
        }
        StoreKind::Sqlite => {
            let p = db_path.unwrap_or_else(|| data_root(data_dir).join("recall.sqlite3"));
            if let Some(parent) = p.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let s = Arc::new(SqliteRepo::open_file(&p).await?);
            Ok(Backend {
                store: s.clone(),
                access: s,
            })
        }
    }
}

fn require_user(args: &Cli) -> Result<UserId> {
    args.user
        .ok_or_else(|| anyhow!("no learner given; pass --user or set LIFEOS_USER"))
}

async fn project_cmd(backend: &Backend, user: UserId, cmd: ProjectCmd) -> Result<()> {
    match cmd {
        ProjectCmd::New => {
            let project = Uuid::new_v4();
            backend.access.grant(user, project).await?;
            info!(%project, %user, "created project");
            println!("{project}");
        }
        ProjectCmd::Grant { project, member } => {
            if !backend.access.has_access(user, project).await? {
                anyhow::bail!("you are not a member of project {project}");
            }
            backend.access.grant(member, project).await?;
            println!("ok");
        }
    }
    Ok(())
}

async fn card_cmd(service: &ReviewService, user: UserId, cmd: CardCmd) -> Result<()> {
    match cmd {
        CardCmd::Add(a) => {
            let c = service
                .add_card(user, a.project, &a.front, &a.back, a.hint.as_deref(), &a.tags)
                .await?;
            println!("{}", c.id);
        }
        CardCmd::List { project } => {
            for e in service.entries(user, project).await? {
                let tags = if e.card.tags.is_empty() { "-".to_string() } else { e.card.tags.join(";") };
                let next = e
                    .state
                    .value
                    .next_review_on()
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}\t{}\t{}\tstage={:?}\tnext={}\ttags={}",
                    e.card.id, e.card.front, e.card.back, e.state.value.stage(), next, tags
                );
            }
        }
        CardCmd::Rm { card_id } => {
            service.delete_card(user, card_id).await?;
            println!("ok");
        }
    }
    Ok(())
}

async fn review_cmd(service: &ReviewService, user: UserId, cmd: ReviewCmd) -> Result<()> {
    let pool = service
        .due_cards(user, cmd.project, cmd.include_new, Some(cmd.max))
        .await?;
    if pool.is_empty() {
        println!("no cards due");
        return Ok(());
    }

    let total = pool.len();
    let mut count = 0usize;
    for CardEntry { card, .. } in pool {
        count += 1;
        println!("\n[{}/{}] {}", count, total, card.id);
        println!("Q: {}", card.front);
        prompt_enter("[enter=show]")?;
        println!("A: {}", card.back);
        if let Some(h) = &card.hint {
            println!("hint: {}", h);
        }
        println!("[0=Again, 1=Hard, 2=Good, 3=Easy, s=skip, q=quit]");
        let grade = loop {
            let line = read_line("rating> ")?;
            match line.trim().to_lowercase().as_str() {
                "s" | "skip" => break None,
                "q" | "quit" => return Ok(()),
                other => match parse_grade(other) {
                    Some(g) => break Some(g),
                    None => println!("enter 0-3, s, or q"),
                },
            }
        };

        if let Some(g) = grade {
            let out = service.submit_review(user, card.id, g.as_score()).await?;
            println!("→ {}", out.summary);
        }
    }

    println!("\nreviewed {}", count);
    Ok(())
}

async fn stats_cmd(service: &ReviewService, user: UserId, cmd: StatsCmd) -> Result<()> {
    let s = service.stats(user, cmd.project).await?;
    println!("total\t{}", s.total);
    println!("due\t{}", s.due);
    println!("new\t{}", s.new);
    println!("learning\t{}", s.learning);
    println!("mature\t{} (review {}, mastered {})", s.mature(), s.review, s.mastered);
    println!("accuracy\t{:.1}%", s.accuracy() * 100.0);
    if cmd.days > 0 {
        println!("\nupcoming");
        for (day, n) in service.forecast(user, cmd.project, cmd.days).await? {
            println!("{day}\t{n}");
        }
    }
    Ok(())
}

async fn export_cmd(service: &ReviewService, user: UserId, cmd: ExportCmd) -> Result<()> {
    match cmd {
        ExportCmd::Csv { path, project } => {
            let entries = service.entries(user, project).await?;
            let mut wtr = csv::Writer::from_path(&path)?;
            wtr.write_record([
                "card_id",
                "front",
                "back",
                "stage",
                "repetitions",
                "interval_days",
                "ease_factor",
                "next_review_on",
                "total_reviews",
                "total_correct",
            ])?;
            for e in entries {
                let stage = format!("{:?}", e.state.value.stage()).to_lowercase();
                let cols = match e.state.value.reviewed() {
                    Some(s) => [
                        s.repetitions.to_string(),
                        s.interval_days.to_string(),
                        format!("{:.2}", s.ease_factor),
                        s.next_review_on.to_string(),
                        s.total_reviews.to_string(),
                        s.total_correct.to_string(),
                    ],
                    None => Default::default(),
                };
                let mut record = vec![e.card.id.to_string(), e.card.front, e.card.back, stage];
                record.extend(cols);
                wtr.write_record(&record)?;
            }
            wtr.flush()?;
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}

// ===== Helpers =====
pub fn parse_grade(s: &str) -> Option<Grade> {
    match s.trim().to_lowercase().as_str() {
        "0" | "a" | "again" => Some(Grade::Again),
        "1" | "h" | "hard" => Some(Grade::Hard),
        "2" | "g" | "good" => Some(Grade::Good),
        "3" | "e" | "easy" => Some(Grade::Easy),
        _ => None,
    }
}

fn prompt_enter(label: &str) -> Result<()> {
    print!("{label}");
    stdout().flush().ok();
    let mut s = String::new();
    stdin().read_line(&mut s)?;
    Ok(())
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    stdout().flush().ok();
    let mut s = String::new();
    stdin().read_line(&mut s)?;
    Ok(s)
}
