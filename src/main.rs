use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;

use cadence::engagement::BADGE_CATALOG;
use cadence::models::{JsonOutput, NewStudyUnit, Semester, TopicKind};
use cadence::schedule::{is_pre_exam_window, parse_iso_date};
use cadence::{CadenceConfig, Database, Engine};

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Grade-driven review scheduler with streaks, levels and badges")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging on stderr
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Extra TOML config file, merged over the default locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage study units
    #[command(subcommand)]
    Unit(UnitCommands),

    /// Manage topics
    #[command(subcommand)]
    Topic(TopicCommands),

    /// Record a grade (0-20) for a topic and schedule its next review
    Grade {
        /// Topic ID
        topic: i64,

        /// Grade between 0 and 20, one decimal at most
        grade: f64,

        /// Pending review being completed; omit for a first assessment
        #[arg(long, short)]
        review: Option<i64>,

        /// Day of the grading (YYYY-MM-DD), defaults to today
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },

    /// Show pending reviews, most urgent first
    Agenda {
        /// Agenda day (YYYY-MM-DD), defaults to today
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },

    /// Show review statistics
    Stats,

    /// List badges and which ones are unlocked
    Badges,

    /// Schedule pre-exam checkpoint reviews for a study unit
    ExamPlan {
        /// Study unit ID
        unit: i64,
    },

    /// Reset points, streaks and badges
    Reset,
}

#[derive(Subcommand)]
enum UnitCommands {
    /// Add a new study unit
    Add {
        /// Unit name
        name: String,

        /// Color tag
        #[arg(long, short, default_value = "#4a90d9")]
        color: String,

        /// Academic year label
        #[arg(long, short, default_value = "")]
        year: String,

        /// autumn or spring
        #[arg(long, short, default_value = "autumn")]
        semester: String,

        /// Exam date (YYYY-MM-DD)
        #[arg(long, short, value_parser = parse_date)]
        exam_date: Option<NaiveDate>,

        /// Days before the exam covered by checkpoint reviews
        #[arg(long, short, default_value_t = 7)]
        pre_exam_days: u32,

        /// Unit is graded by continuous assessment
        #[arg(long)]
        continuous: bool,
    },

    /// List active study units
    List,

    /// Hide a study unit and its topics from the agenda
    Deactivate {
        /// Study unit ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum TopicCommands {
    /// Add a topic to a study unit
    Add {
        /// Study unit ID
        unit: i64,

        /// Topic title
        title: String,

        /// course or synthesis
        #[arg(long, short, default_value = "course")]
        kind: String,
    },

    /// List the active topics of a study unit
    List {
        /// Study unit ID
        unit: i64,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    parse_iso_date(s).map_err(|e| e.to_string())
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("CADENCE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

fn print_json<T: Serialize>(data: T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(&JsonOutput::ok(data))?);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = init_tracing(cli.quiet, cli.verbose) {
        eprintln!("Warning: {e}");
    }

    if let Err(e) = run(cli).await {
        if json {
            if let Ok(out) = serde_json::to_string(&JsonOutput::<()>::err(format!("{e:#}"))) {
                println!("{out}");
            }
        } else {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = CadenceConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    let db_path = config.database_path();
    let db = Database::open(&db_path)
        .with_context(|| format!("opening database at {}", db_path.display()))?;
    db.init()?;

    let engine = Engine::from_config(db, &config);
    let db = engine.gateway();
    let today = chrono::Local::now().date_naive();

    match cli.command {
        Commands::Init => {
            if cli.json {
                print_json(serde_json::json!({ "path": db_path }))?;
            } else {
                println!("Database initialized at: {}", db_path.display());
            }
        }

        Commands::Unit(unit_cmd) => match unit_cmd {
            UnitCommands::Add {
                name,
                color,
                year,
                semester,
                exam_date,
                pre_exam_days,
                continuous,
            } => {
                let Some(semester) = Semester::from_str(&semester) else {
                    bail!("Invalid semester '{semester}'. Use: autumn or spring");
                };
                let id = db.add_study_unit(&NewStudyUnit {
                    name: name.clone(),
                    color,
                    year,
                    semester,
                    exam_date,
                    pre_exam_days,
                    continuous_assessment: continuous,
                })?;

                if cli.json {
                    print_json(serde_json::json!({ "id": id, "name": name }))?;
                } else {
                    println!("Added study unit '{}' with ID: {}", name, id);
                }
            }

            UnitCommands::List => {
                let units = db.list_active_study_units()?;
                if cli.json {
                    print_json(&units)?;
                } else if units.is_empty() {
                    println!("No study units found.");
                } else {
                    println!("{:<5} {:<30} {:<8} {:<12} EXAM", "ID", "NAME", "YEAR", "SEMESTER");
                    println!("{}", "-".repeat(70));
                    for unit in units {
                        let exam = match unit.exam_date {
                            Some(d) if is_pre_exam_window(d, unit.pre_exam_days, today) => {
                                format!("{} (revision window)", d)
                            }
                            Some(d) => d.to_string(),
                            None => "-".to_string(),
                        };
                        println!(
                            "{:<5} {:<30} {:<8} {:<12} {}",
                            unit.id,
                            truncate(&unit.name, 28),
                            unit.year,
                            unit.semester.as_str(),
                            exam
                        );
                    }
                }
            }

            UnitCommands::Deactivate { id } => {
                if db.deactivate_study_unit(id)? {
                    if cli.json {
                        print_json(())?;
                    } else {
                        println!("Study unit {} deactivated.", id);
                    }
                } else {
                    bail!("Study unit {id} not found or already inactive");
                }
            }
        },

        Commands::Topic(topic_cmd) => match topic_cmd {
            TopicCommands::Add { unit, title, kind } => {
                let Some(kind) = TopicKind::from_str(&kind) else {
                    bail!("Invalid kind '{kind}'. Use: course or synthesis");
                };
                if db.get_study_unit(unit)?.is_none() {
                    bail!("Study unit {unit} not found");
                }
                let id = db.add_topic(unit, &title, kind)?;

                if cli.json {
                    print_json(serde_json::json!({ "id": id, "title": title }))?;
                } else {
                    println!("Added topic '{}' with ID: {}", title, id);
                    println!("Record a first grade with:");
                    println!("  cadence grade {} <0-20>", id);
                }
            }

            TopicCommands::List { unit } => {
                let topics = db.list_topics(unit)?;
                if cli.json {
                    print_json(&topics)?;
                } else if topics.is_empty() {
                    println!("No topics found.");
                } else {
                    println!("{:<5} {:<40} KIND", "ID", "TITLE");
                    println!("{}", "-".repeat(60));
                    for topic in topics {
                        println!(
                            "{:<5} {:<40} {}",
                            topic.id,
                            truncate(&topic.title, 38),
                            topic.kind.as_str()
                        );
                    }
                }
            }
        },

        Commands::Grade {
            topic,
            grade,
            review,
            date,
        } => {
            let outcome = engine
                .submit_grade(topic, review, grade, date.unwrap_or(today))
                .await?;

            if cli.json {
                print_json(&outcome)?;
            } else {
                println!("Grade {} recorded for topic {}.", grade, topic);
                println!(
                    "Next review in {} day(s), on {} (review ID {}).",
                    outcome.next_interval, outcome.next_date, outcome.next_review_id
                );
                match &outcome.bookkeeping_error {
                    Some(err) => println!("Points could not be updated: {}", err),
                    None => println!("+{} points", outcome.points_awarded),
                }
                for id in &outcome.new_badges {
                    let badge = cadence::engagement::badges::definition(*id);
                    println!("Badge unlocked: {} {} (+100)", badge.icon, badge.name);
                }
            }
        }

        Commands::Agenda { date } => {
            let date = date.unwrap_or(today);
            let agenda = engine.prioritized_agenda(date).await?;

            if cli.json {
                print_json(&agenda)?;
            } else if agenda.is_empty() {
                println!("Nothing to review on {}.", date);
            } else {
                println!(
                    "{:<6} {:<8} {:<36} {:<6} {:<12} STATUS",
                    "ID", "TOPIC", "TITLE", "GRADE", "SCHEDULED"
                );
                println!("{}", "-".repeat(82));
                for review in agenda {
                    let title = db
                        .get_topic(review.topic_id)?
                        .map(|t| t.title)
                        .unwrap_or_default();
                    let status = if review.is_overdue(date) {
                        "overdue"
                    } else if review.is_pre_exam() {
                        "pre-exam"
                    } else {
                        "due"
                    };
                    println!(
                        "{:<6} {:<8} {:<36} {:<6.1} {:<12} {}",
                        review.id,
                        review.topic_id,
                        truncate(&title, 34),
                        review.grade,
                        review.scheduled_date.to_string(),
                        status
                    );
                }
            }
        }

        Commands::Stats => {
            let stats = engine.stats().snapshot(today).await?;
            if cli.json {
                print_json(&stats)?;
            } else {
                println!("=== Review Statistics ===");
                println!("Completed reviews: {}", stats.total_completed);
                println!(
                    "Streak: {} day(s) (best {})",
                    stats.streak, stats.best_streak
                );
                println!("Average grade: {:.1}/20", stats.average_grade);
                println!("Average improvement: {:+.1}", stats.average_improvement);
                println!("Perfect scores: {}", stats.perfect_scores);
                println!(
                    "Last 7 days: {}, last 30 days: {}",
                    stats.weekly_completed, stats.monthly_completed
                );
                println!("Today: {:.0}% done", stats.daily_progress);
                println!(
                    "Level {} ({} points, {}/{} to next)",
                    stats.level, stats.total_points, stats.next_level.current, stats.next_level.required
                );
                let d = &stats.distribution;
                println!(
                    "Grades 16-20: {}  13-15: {}  10-12: {}  7-9: {}  0-6: {}",
                    d.excellent, d.good, d.average, d.poor, d.very_poor
                );
            }
        }

        Commands::Badges => {
            let state = db.get_engagement()?;
            if cli.json {
                let badges: Vec<_> = BADGE_CATALOG
                    .iter()
                    .map(|b| {
                        serde_json::json!({
                            "id": b.id,
                            "name": b.name,
                            "description": b.description,
                            "icon": b.icon,
                            "tier": b.tier,
                            "unlocked": state.unlocked_badges.contains(&b.id),
                        })
                    })
                    .collect();
                print_json(badges)?;
            } else {
                for b in BADGE_CATALOG.iter() {
                    let mark = if state.unlocked_badges.contains(&b.id) {
                        "x"
                    } else {
                        " "
                    };
                    println!(
                        "[{}] {} {:<14} {:<7} {}",
                        mark,
                        b.icon,
                        b.name,
                        b.tier.label(),
                        b.description
                    );
                }
            }
        }

        Commands::ExamPlan { unit } => {
            let created = engine.plan_exam_checkpoints(unit, today).await?;
            if cli.json {
                print_json(&created)?;
            } else if created.is_empty() {
                println!("No new checkpoints to schedule.");
            } else {
                for review in &created {
                    println!(
                        "Topic {}: checkpoint on {} ({} day(s) before the exam)",
                        review.topic_id, review.scheduled_date, review.interval_days
                    );
                }
                println!("Scheduled {} checkpoint review(s).", created.len());
            }
        }

        Commands::Reset => {
            engine.reset_engagement().await?;
            if cli.json {
                print_json(())?;
            } else {
                println!("Points, streaks and badges reset.");
            }
        }
    }

    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
