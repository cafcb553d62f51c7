use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

mod analytics;
mod catalog;
mod config;
mod db;
mod models;
mod permissions;
mod report;
mod session;
mod store;
mod submission;
mod telemetry;

use crate::config::AppConfig;
use crate::models::NewUser;
use crate::session::Session;
use crate::store::{
    DepartmentCatalog, MemoryStore, PermissionStore, Snapshot, SubmissionStore, UserDirectory,
};
use crate::submission::SubmissionDraft;

#[derive(Parser)]
#[command(name = "cross-survey")]
#[command(about = "Departments rating departments: submissions, permissions and analytics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where read commands take their data from.
#[derive(Args, Debug)]
struct SourceArgs {
    /// Analyse a submissions CSV export instead of Postgres
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Override the department catalog with an id,name CSV
    #[arg(long)]
    departments: Option<PathBuf>,
    /// Reference instant for trend windows (RFC 3339), defaults to now
    #[arg(long)]
    now: Option<DateTime<Utc>>,
}

impl SourceArgs {
    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the department catalog, demo users and default permissions
    Seed,
    /// Import submissions from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print the five survey questions
    Questions,
    /// Rate another department
    Submit {
        #[arg(long = "as")]
        as_user: String,
        #[arg(long)]
        to: i32,
        /// Five answers between 1 and 5, comma separated
        #[arg(long, value_delimiter = ',')]
        answers: Vec<i16>,
        #[arg(long)]
        remark: Option<String>,
    },
    /// List the departments a user may rate and which are done
    Assignments {
        #[arg(long = "as")]
        as_user: String,
        #[arg(long)]
        json: bool,
    },
    /// Average rating, response count and trend per department
    Departments {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        json: bool,
    },
    /// Rating, trend, monthly series and remarks for one department
    Department {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        id: i32,
        #[arg(long)]
        json: bool,
    },
    /// Departments averaging below 4.0
    Alerts {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        json: bool,
    },
    /// Share of submissions per star rating
    Distribution {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        json: bool,
    },
    /// Average rating per month, January to June
    Trends {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        json: bool,
    },
    /// Headline counters across all submissions
    Overview {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Browse submission remarks
    Remarks {
        #[command(flatten)]
        source: SourceArgs,
        /// Only remarks about this department id
        #[arg(long)]
        department: Option<i32>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Inspect or edit which departments may rate which
    Permissions {
        #[command(subcommand)]
        command: PermissionCommand,
    },
    /// Manage user accounts
    Users {
        #[command(subcommand)]
        command: UserCommand,
    },
}

#[derive(Subcommand)]
enum PermissionCommand {
    /// Print the permission matrix
    Show,
    /// Allow one department to rate another
    Grant(PermissionEdit),
    /// Stop one department from rating another
    Revoke(PermissionEdit),
    /// Flip a single matrix cell
    Toggle(PermissionEdit),
}

#[derive(Args)]
struct PermissionEdit {
    #[arg(long = "as")]
    as_user: String,
    #[arg(long)]
    from: i32,
    #[arg(long)]
    to: i32,
}

#[derive(Subcommand)]
enum UserCommand {
    List {
        #[arg(long = "as")]
        as_user: String,
    },
    Add {
        #[arg(long = "as")]
        as_user: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        department: i32,
        #[arg(long)]
        admin: bool,
    },
    Remove {
        #[arg(long = "as")]
        as_user: String,
        #[arg(long)]
        username: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    match cli.command {
        Commands::InitDb => {
            db::connect(&config).await?.init_db().await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::connect(&config).await?.seed(&config).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::connect(&config).await?.import_csv(&csv).await?;
            println!("Inserted {inserted} submissions from {}.", csv.display());
        }
        Commands::Questions => {
            for (index, question) in submission::QUESTIONS.iter().enumerate() {
                println!("{}. {question}", index + 1);
            }
        }
        Commands::Submit {
            as_user,
            to,
            answers,
            remark,
        } => {
            let answers: [i16; models::QUESTION_COUNT] = answers
                .try_into()
                .map_err(|given: Vec<i16>| {
                    anyhow::anyhow!("expected 5 answers, got {}", given.len())
                })?;
            let store = db::connect(&config).await?;
            let session = Session::login(&store, &as_user).await?;
            let draft = SubmissionDraft {
                to_department_id: to,
                answers,
                remark,
            };
            let record = submission::submit(&store, &session, draft, Utc::now()).await?;
            println!(
                "Recorded submission {} for department {} (score {:.1}).",
                record.id,
                record.to_department_id,
                analytics::score(&record)
            );
        }
        Commands::Assignments { as_user, json } => {
            let store = db::connect(&config).await?;
            let session = Session::login(&store, &as_user).await?;
            let summary = submission::assignments(
                &session,
                &store.permission_matrix().await?,
                &store.list_departments().await?,
                &store.list_submissions().await?,
            );

            if json {
                return print_json(&summary);
            }
            if summary.assignments.is_empty() {
                println!("No departments are open for rating from your department.");
                return Ok(());
            }

            match summary.own_department_rating {
                Some(rating) => println!("Your department is rated {rating:.1}/5."),
                None => println!("Your department has not been rated yet."),
            }
            println!(
                "{} of {} surveys completed ({}%):",
                summary.completed, summary.total, summary.completion_percentage
            );
            for entry in summary.assignments.iter() {
                match entry.last_rating {
                    Some(rating) => {
                        println!("- [done] {} rated {:.1}", entry.department_name, rating)
                    }
                    None => println!("- [pending] {}", entry.department_name),
                }
            }
        }
        Commands::Departments { source, json } => {
            let snapshot = read_snapshot(&config, &source).await?;
            let stats = analytics::department_stats(
                &snapshot.submissions,
                &snapshot.departments,
                source.now(),
            );

            if json {
                return print_json(&stats);
            }
            if stats.is_empty() {
                println!("No department ratings yet.");
                return Ok(());
            }

            println!("Department ratings:");
            for entry in stats.iter() {
                println!(
                    "- {} ({}) {:.1} across {} responses, trend {}",
                    entry.name,
                    entry.id,
                    entry.avg_rating,
                    entry.total_responses,
                    entry.trend.label()
                );
            }
        }
        Commands::Department { source, id, json } => {
            let snapshot = read_snapshot(&config, &source).await?;
            let detail = report::department_detail(
                &snapshot.submissions,
                &snapshot.departments,
                id,
                source.now(),
            )
            .with_context(|| format!("department {id} is not in the catalog"))?;

            if json {
                return print_json(&detail);
            }

            println!("{} ({})", detail.name, detail.id);
            let Some(stats) = detail.stats.as_ref() else {
                println!("No ratings yet.");
                return Ok(());
            };
            println!(
                "Average rating: {:.1} across {} responses, trend {}",
                stats.avg_rating,
                stats.total_responses,
                stats.trend.label()
            );
            if detail.needs_attention {
                println!(
                    "Performance alert: below the {:.1} threshold.",
                    analytics::ALERT_THRESHOLD
                );
            }
            for point in detail.monthly_trends.iter().filter(|point| point.responses > 0) {
                println!(
                    "{} {:.1} ({} responses)",
                    point.month, point.avg_rating, point.responses
                );
            }
            for entry in detail.remarks.iter().take(10) {
                println!(
                    "- {} on {}: {}",
                    entry.from_department,
                    entry.submitted_at.date_naive(),
                    entry.remark
                );
            }
        }
        Commands::Alerts { source, json } => {
            let snapshot = read_snapshot(&config, &source).await?;
            let stats = analytics::department_stats(
                &snapshot.submissions,
                &snapshot.departments,
                source.now(),
            );
            let alerts = analytics::performance_alerts(&stats);

            if json {
                return print_json(&alerts);
            }
            if stats.is_empty() {
                println!("No department ratings yet.");
                return Ok(());
            }
            if alerts.is_empty() {
                println!(
                    "All rated departments average {:.1} or higher.",
                    analytics::ALERT_THRESHOLD
                );
                return Ok(());
            }

            println!("Departments below {:.1}:", analytics::ALERT_THRESHOLD);
            for entry in alerts.iter() {
                println!(
                    "- {} ({}) {:.1} across {} responses",
                    entry.name, entry.id, entry.avg_rating, entry.total_responses
                );
            }
        }
        Commands::Distribution { source, json } => {
            let snapshot = read_snapshot(&config, &source).await?;
            let buckets = analytics::rating_distribution(&snapshot.submissions);

            if json {
                return print_json(&buckets);
            }
            if buckets.iter().all(|bucket| bucket.count == 0) {
                println!("No ratings yet.");
                return Ok(());
            }

            for bucket in buckets.iter() {
                println!(
                    "{:<8} {:>5} {:>4}%",
                    bucket.label, bucket.count, bucket.percentage
                );
            }
        }
        Commands::Trends { source, json } => {
            let snapshot = read_snapshot(&config, &source).await?;
            let points = analytics::monthly_trends(&snapshot.submissions);

            if json {
                return print_json(&points);
            }
            if points.iter().all(|point| point.responses == 0) {
                println!("No monthly data yet.");
                return Ok(());
            }

            for point in points.iter() {
                println!(
                    "{} {:.1} ({} responses)",
                    point.month, point.avg_rating, point.responses
                );
            }
        }
        Commands::Overview { source, json } => {
            let snapshot = read_snapshot(&config, &source).await?;
            let overview = analytics::overview_stats(&snapshot.submissions, config.survey_capacity);

            if json {
                return print_json(&overview);
            }

            println!("Total responses: {}", overview.total_responses);
            println!("Average rating:  {:.1}", overview.average_rating);
            println!("Completion rate: {}%", overview.completion_rate);
            println!("Pending reviews: {}", overview.pending_reviews);
        }
        Commands::Report { source, out } => {
            let snapshot = read_snapshot(&config, &source).await?;
            let report = report::build_report(
                &snapshot.submissions,
                &snapshot.departments,
                source.now(),
                config.survey_capacity,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write report to {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Remarks {
            source,
            department,
            search,
            limit,
            json,
        } => {
            let snapshot = read_snapshot(&config, &source).await?;
            let entries: Vec<_> = report::remarks(
                &snapshot.submissions,
                &snapshot.departments,
                department,
                search.as_deref(),
            )
            .into_iter()
            .take(limit)
            .collect();

            if json {
                return print_json(&entries);
            }
            if entries.is_empty() {
                println!("No remarks found.");
                return Ok(());
            }

            for entry in entries.iter() {
                println!(
                    "- {} -> {} on {}: {}",
                    entry.from_department,
                    entry.to_department,
                    entry.submitted_at.date_naive(),
                    entry.remark
                );
            }
        }
        Commands::Permissions { command } => {
            let store = db::connect(&config).await?;
            run_permissions(&store, command).await?;
        }
        Commands::Users { command } => {
            let store = db::connect(&config).await?;
            run_users(&store, command).await?;
        }
    }

    Ok(())
}

async fn read_snapshot(config: &AppConfig, source: &SourceArgs) -> anyhow::Result<Snapshot> {
    let mut snapshot = match &source.csv {
        Some(path) => {
            let store = MemoryStore::from_csv(
                path,
                catalog::default_departments(),
                config.default_permission,
            )?;
            store::load_snapshot(&store).await?
        }
        None => store::load_snapshot(&db::connect(config).await?).await?,
    };

    if let Some(path) = &source.departments {
        snapshot.departments = catalog::load_csv(path)?;
    }
    tracing::debug!(
        submissions = snapshot.submissions.len(),
        departments = snapshot.departments.len(),
        "snapshot loaded"
    );
    Ok(snapshot)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_permissions<S>(store: &S, command: PermissionCommand) -> anyhow::Result<()>
where
    S: PermissionStore + DepartmentCatalog + UserDirectory,
{
    let departments = store.list_departments().await?;
    let mut matrix = store.permission_matrix().await?;

    let edit = match command {
        PermissionCommand::Show => {
            if matrix.is_empty() {
                println!("No department may rate another yet.");
            }
            print!("{}", matrix.render(&departments));
            return Ok(());
        }
        PermissionCommand::Grant(edit) => {
            matrix.grant(edit.from, edit.to);
            edit
        }
        PermissionCommand::Revoke(edit) => {
            matrix.revoke(edit.from, edit.to);
            edit
        }
        PermissionCommand::Toggle(edit) => {
            matrix.toggle(edit.from, edit.to);
            edit
        }
    };

    let session = Session::login(store, &edit.as_user).await?;
    session.require_admin()?;
    for id in [edit.from, edit.to] {
        if !departments.iter().any(|department| department.id == id) {
            anyhow::bail!("department {id} is not in the catalog");
        }
    }
    if edit.from == edit.to {
        anyhow::bail!("departments cannot rate themselves");
    }

    store.save_permission_matrix(&matrix).await?;
    let allowed = matrix.is_allowed(edit.from, edit.to);
    tracing::info!(
        admin = %session.user().username,
        from = edit.from,
        to = edit.to,
        allowed,
        "permission updated"
    );
    println!(
        "{} {} rate {}.",
        catalog::department_name(&departments, edit.from),
        if allowed { "may" } else { "may not" },
        catalog::department_name(&departments, edit.to)
    );
    Ok(())
}

async fn run_users<S>(store: &S, command: UserCommand) -> anyhow::Result<()>
where
    S: UserDirectory + DepartmentCatalog,
{
    match command {
        UserCommand::List { as_user } => {
            Session::login(store, &as_user).await?.require_admin()?;
            let departments = store.list_departments().await?;
            for user in store.list_users().await? {
                println!(
                    "- {} ({}){}",
                    user.username,
                    catalog::department_name(&departments, user.department_id),
                    if user.is_admin { " [admin]" } else { "" }
                );
            }
        }
        UserCommand::Add {
            as_user,
            username,
            department,
            admin,
        } => {
            Session::login(store, &as_user).await?.require_admin()?;
            let username = username.trim().to_string();
            if username.is_empty() {
                anyhow::bail!("username must not be empty");
            }
            if !store
                .list_departments()
                .await?
                .iter()
                .any(|entry| entry.id == department)
            {
                anyhow::bail!("department {department} is not in the catalog");
            }

            let user = store
                .add_user(NewUser {
                    username,
                    department_id: department,
                    is_admin: admin,
                })
                .await?;
            println!("Added user {} (id {}).", user.username, user.id);
        }
        UserCommand::Remove { as_user, username } => {
            let session = Session::login(store, &as_user).await?;
            session.require_admin()?;
            if session.user().username == username {
                anyhow::bail!("administrators cannot remove their own account");
            }
            store.remove_user(&username).await?;
            println!("Removed user {username}.");
        }
    }

    Ok(())
}
