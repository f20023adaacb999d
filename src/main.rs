mod analyzer;
mod api;
mod app;
mod auth;
mod billing;
mod cli;
mod config;
mod db;
mod error;
mod service;
mod streak;

use crate::app::AppState;
use crate::auth::{Authenticator, Session};
use crate::billing::{BillingClient, CustomerInfo, is_active_subscriber};
use crate::cli::onboard::{prompt_email, prompt_new_password, prompt_password, run_onboarding};
use crate::cli::{Cli, Commands, ConfigCommands, SubscriptionCommands};
use crate::config::{Config, is_secret_key};
use crate::db::Database;
use crate::streak::{Goal, HabitKind, Streak, current_milestone_benefit, next_milestone};
use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::Parser;
use dialoguer::{Confirm, Input, theme::ColorfulTheme};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Onboard => {
            let _ = run_onboarding(load_or_default_config()?)?;
            Ok(())
        }
        Commands::Signup { email, name } => handle_signup(email, name),
        Commands::Login { email } => handle_login(email),
        Commands::Logout => handle_logout(),
        Commands::Status => handle_status(),
        Commands::Streaks => handle_streaks(),
        Commands::Show { id } => handle_show(id),
        Commands::Create { kind, goal } => handle_create(kind, goal),
        Commands::Confirm { id } => handle_confirm(id),
        Commands::Reset { id, yes } => handle_reset(id, yes),
        Commands::Deactivate { id } => handle_deactivate(id),
        Commands::Attempts { id } => handle_attempts(id),
        Commands::Quotes { count, category } => handle_quotes(count, category),
        Commands::Report { date } => handle_report(date),
        Commands::Export { output } => handle_export(output),
        Commands::Subscription { command } => handle_subscription_command(command),
        Commands::Config { command } => handle_config_command(command),
        Commands::Serve => {
            let config = load_or_default_config()?;
            handle_serve(config).await
        }
        Commands::Doctor => handle_doctor(),
    }
}

fn handle_signup(email: Option<String>, name: Option<String>) -> Result<()> {
    let config = load_or_default_config()?;
    let database = Database::open(&config.db_path)?;
    let mut auth = Authenticator::restore(&database, config.session_path.clone())?;
    let theme = ColorfulTheme::default();

    let email = match email {
        Some(email) => email,
        None => prompt_email(&theme)?,
    };
    let name = match name {
        Some(name) => name,
        None => Input::with_theme(&theme)
            .with_prompt("  Name")
            .interact_text()
            .context("Failed to read name")?,
    };
    let password = prompt_new_password(&theme)?;

    auth.sign_up(&database, &email, &password, &name)?;
    let session = auth.sign_in(&database, &email, &password)?;
    println!("Account created. Signed in as {}", session.email);

    sign_in_state(database, session).map(|_| ())
}

fn handle_login(email: Option<String>) -> Result<()> {
    let config = load_or_default_config()?;
    let database = Database::open(&config.db_path)?;
    let mut auth = Authenticator::restore(&database, config.session_path.clone())?;
    let theme = ColorfulTheme::default();

    if let Some(session) = auth.current_session() {
        warn!(user_id = session.user_id, "replacing existing session");
        auth.sign_out(&database)?;
    }

    let email = match email {
        Some(email) => email,
        None => prompt_email(&theme)?,
    };
    let password = prompt_password(&theme)?;
    let session = auth.sign_in(&database, &email, &password)?;
    println!("Signed in as {}", session.email);

    let state = sign_in_state(database, session)?;
    print_streak_list(state.streaks());

    Ok(())
}

fn handle_logout() -> Result<()> {
    let config = load_config()?;
    let database = Database::open(&config.db_path)?;
    let mut auth = Authenticator::restore(&database, config.session_path.clone())?;

    let Some(session) = auth.current_session().cloned() else {
        println!("Not signed in.");
        return Ok(());
    };

    let state = AppState::new(database, Some(session));
    let database = state.sign_out();
    auth.sign_out(&database)?;
    println!("Signed out.");

    Ok(())
}

fn handle_status() -> Result<()> {
    let config = load_config()?;
    let database = Database::open(&config.db_path)?;
    let auth = Authenticator::restore(&database, config.session_path.clone())?;

    println!("Vices status");
    println!("- config: {}", Config::config_path()?.display());
    println!("- database: {}", config.db_path.display());

    let Some(session) = auth.current_session().cloned() else {
        println!("- signed_in: false");
        return Ok(());
    };

    println!("- signed_in: {}", session.email);
    let state = start_state(database, session)?;
    if let Some(user) = state.user() {
        let vices = user
            .vices
            .iter()
            .map(|kind| kind.display_name())
            .collect::<Vec<_>>();
        println!(
            "- vices: {}",
            if vices.is_empty() {
                "none".to_string()
            } else {
                vices.join(", ")
            }
        );
    }
    println!("- active_streaks: {}", state.streaks().len());
    print_streak_list(state.streaks());

    if let Some(quote) = state.quotes().first() {
        println!("\n\"{}\" - {}", quote.text, quote.author);
    }

    Ok(())
}

fn handle_streaks() -> Result<()> {
    let (_, state) = signed_in_state()?;
    print_streak_list(state.streaks());
    Ok(())
}

fn handle_show(id: i64) -> Result<()> {
    let (config, mut state) = signed_in_state()?;
    require_subscription(&config, &state)?;

    let progress = state.progress_data(id)?;
    let streak = state
        .streaks()
        .iter()
        .find(|streak| streak.id == id)
        .cloned()
        .with_context(|| format!("Streak {id} not found"))?;

    println!(
        "{} {} streak #{}",
        streak.kind.icon(),
        streak.kind.display_name(),
        streak.id
    );
    println!(
        "- progress: {}/{} days ({}%)",
        progress.current_streak, progress.goal, progress.progress
    );
    println!("- {}", progress.encouragement);
    println!(
        "- started: {}",
        streak.start_date.with_timezone(&Local).format("%Y-%m-%d")
    );
    println!(
        "- current benefit: {}",
        current_milestone_benefit(streak.current_streak, streak.goal, streak.kind)
    );

    println!("\nMilestones");
    for milestone in &streak.milestones {
        let mark = if milestone.is_reached { "✓" } else { " " };
        println!(
            "[{mark}] day {:>3} {:>3}%  {}",
            milestone.day_count, milestone.percentage, milestone.title
        );
        println!("          {}", milestone.benefit.for_kind(streak.kind));
    }

    if progress.attempt_history.is_empty() {
        println!("\nNo previous attempts.");
    } else {
        let history = progress
            .attempt_history
            .iter()
            .map(|days| days.to_string())
            .collect::<Vec<_>>()
            .join(" → ");
        println!("\nRecent attempts (days): {history}");
    }

    Ok(())
}

fn handle_create(kind: HabitKind, goal: Option<i64>) -> Result<()> {
    let (_, mut state) = signed_in_state()?;
    let goal = goal.map(Goal::new).transpose()?.unwrap_or_default();

    if let Some(existing) = state.streak_by_kind(kind) {
        warn!(streak_id = existing.id, kind = %kind, "an active streak of this kind already exists");
    }

    let streak = state.create_streak(kind, goal)?;
    println!(
        "Created streak #{}: {} {} (goal: {} days)",
        streak.id,
        streak.kind.icon(),
        streak.kind.display_name(),
        streak.goal
    );

    Ok(())
}

fn handle_confirm(id: i64) -> Result<()> {
    let (_, mut state) = signed_in_state()?;
    let reached_before = state
        .streaks()
        .iter()
        .find(|streak| streak.id == id)
        .map(|streak| {
            streak
                .milestones
                .iter()
                .filter(|milestone| milestone.is_reached)
                .count()
        })
        .unwrap_or_default();

    let streak = state.confirm_today(id)?;
    println!(
        "{} {}: {} days (goal {}, {}%)",
        streak.kind.icon(),
        streak.kind.display_name(),
        streak.current_streak,
        streak.goal,
        streak.progress()
    );

    for milestone in streak
        .milestones
        .iter()
        .filter(|milestone| milestone.is_reached)
        .skip(reached_before)
    {
        println!("🏆 Milestone reached: {} - {}", milestone.title, milestone.description);
    }

    Ok(())
}

fn handle_reset(id: i64, yes: bool) -> Result<()> {
    let (_, mut state) = signed_in_state()?;

    if !yes {
        let proceed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Reset this streak? Your current run will be saved as an attempt.")
            .default(false)
            .interact()
            .context("Failed to read reset confirmation")?;
        if !proceed {
            println!("Reset cancelled.");
            return Ok(());
        }
    }

    match state.reset_streak(id)? {
        Some(attempt) => println!(
            "Streak reset. Attempt of {} days saved{}.",
            attempt.duration,
            if attempt.is_completed {
                " (goal completed)"
            } else {
                ""
            }
        ),
        None => println!("Streak reset."),
    }
    println!("Every day is a new beginning.");

    Ok(())
}

fn handle_deactivate(id: i64) -> Result<()> {
    let (_, mut state) = signed_in_state()?;
    state.deactivate_streak(id)?;
    println!("Streak #{id} deactivated.");
    Ok(())
}

fn handle_attempts(id: i64) -> Result<()> {
    let (_, mut state) = signed_in_state()?;
    let attempts = state.attempts(id)?;

    if attempts.is_empty() {
        println!("No attempts recorded for streak #{id}.");
        return Ok(());
    }

    for attempt in attempts {
        let ended = attempt
            .end_date
            .map(|at| at.with_timezone(&Local).format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "- {} → {}: {} days{}",
            attempt.start_date.with_timezone(&Local).format("%Y-%m-%d"),
            ended,
            attempt.duration,
            if attempt.is_completed { " ✓" } else { "" }
        );
    }

    Ok(())
}

fn handle_quotes(count: Option<usize>, category: Option<String>) -> Result<()> {
    let config = load_or_default_config()?;
    let database = Database::open(&config.db_path)?;

    let quotes = match category {
        Some(category) => service::quotes_by_category(&database, &category)?,
        None => {
            let mut state = AppState::new(database, None);
            state.load_quotes(count.unwrap_or(config.quote_count).max(1))?;
            state.quotes().to_vec()
        }
    };

    if quotes.is_empty() {
        println!("No quotes found.");
    }
    for quote in quotes {
        println!("\"{}\"\n  - {}\n", quote.text, quote.author);
    }

    Ok(())
}

fn handle_report(date: Option<String>) -> Result<()> {
    let (config, state) = signed_in_state()?;
    require_subscription(&config, &state)?;

    let date = parse_optional_date(date)?;
    let session = state
        .session()
        .cloned()
        .context("Not signed in. Run `vices login` first.")?;
    let (report, saved) =
        analyzer::generate_and_store_report(&config, state.store(), &session, date)?;

    println!("Report generated: {}", report.date);
    println!("- Markdown: {}", saved.markdown_path.display());
    println!("- JSON: {}", saved.json_path.display());

    Ok(())
}

fn handle_export(output: Option<PathBuf>) -> Result<()> {
    let (config, state) = signed_in_state()?;
    let session = state
        .session()
        .cloned()
        .context("Not signed in. Run `vices login` first.")?;

    let export = analyzer::export_user_data(state.store(), &session)?;
    let path = output.unwrap_or_else(|| {
        config
            .report_dir
            .join(format!("export-{}.json", Local::now().format("%Y-%m-%d")))
    });
    analyzer::write_export(&export, &path)?;
    println!("Data exported: {}", path.display());

    Ok(())
}

fn handle_subscription_command(command: SubscriptionCommands) -> Result<()> {
    let (config, state) = signed_in_state()?;
    let owner_id = state
        .session()
        .map(|session| session.user_id)
        .context("Not signed in. Run `vices login` first.")?;

    let mut client = BillingClient::from_config(&config)?;
    client.initialize(owner_id)?;

    match command {
        SubscriptionCommands::Status => {
            print_customer_info(&client.customer_info()?);
        }
        SubscriptionCommands::Offerings => {
            let offerings = client.offerings()?;
            if offerings.is_empty() {
                println!("No offerings available.");
            }
            for offering in offerings {
                println!("{} - {}", offering.identifier, offering.description);
                for package in offering.packages {
                    println!("  - {} ({})", package.identifier, package.product_id);
                }
            }
        }
        SubscriptionCommands::Purchase { package, token } => {
            let package = client
                .offerings()?
                .into_iter()
                .flat_map(|offering| offering.packages)
                .find(|candidate| candidate.identifier == package)
                .with_context(|| format!("Package not found: {package}"))?;

            let result = client.purchase(&package, &token);
            match (result.success, result.customer_info) {
                (true, Some(info)) => {
                    println!("Purchase successful.");
                    print_customer_info(&info);
                }
                _ => bail!(
                    "Purchase failed: {}",
                    result.error.unwrap_or_else(|| "unknown error".to_string())
                ),
            }
        }
        SubscriptionCommands::Restore => {
            let info = client.restore()?;
            println!("Purchases restored.");
            print_customer_info(&info);
        }
    }

    client.log_out();
    Ok(())
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = load_or_default_config()?;
            config.set_value(&key, &value)?;
            config.ensure_bootstrap_files()?;
            config.save()?;

            let masked = if is_secret_key(&key) {
                "***hidden***".to_string()
            } else {
                value
            };
            println!("Config saved: {key} = {masked}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = load_config()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_doctor() -> Result<()> {
    let config_path = Config::config_path()?;
    let mut issues = Vec::new();

    if config_path.exists() {
        println!("[OK] config.json found: {}", config_path.display());
    } else {
        println!("[WARN] config.json not found: {}", config_path.display());
        issues.push("config missing".to_string());
    }

    let config = load_or_default_config()?;

    match Database::open(&config.db_path) {
        Ok(database) => {
            println!("[OK] SQLite reachable: {}", config.db_path.display());
            match Authenticator::restore(&database, config.session_path.clone()) {
                Ok(auth) => match auth.current_session() {
                    Some(session) => println!("[OK] signed in as {}", session.email),
                    None => {
                        println!("[WARN] not signed in");
                        issues.push("no session".to_string());
                    }
                },
                Err(error) => {
                    println!("[WARN] session check failed: {error}");
                    issues.push("session unreadable".to_string());
                }
            }
        }
        Err(error) => {
            println!("[WARN] SQLite check failed: {error}");
            issues.push("db unreachable".to_string());
        }
    }

    if config.report_dir.exists() {
        println!("[OK] report dir exists: {}", config.report_dir.display());
    } else {
        println!("[WARN] report dir missing: {}", config.report_dir.display());
        issues.push("report dir missing".to_string());
    }

    match (config.resolved_billing_api_key().is_some(), config.require_subscription) {
        (true, _) => println!("[OK] billing API key configured"),
        (false, true) => {
            println!("[WARN] require_subscription is on but no billing API key is set");
            issues.push("billing key missing".to_string());
        }
        (false, false) => println!("[INFO] billing disabled (no API key)"),
    }

    if issues.is_empty() {
        println!("\nAll checks passed.");
    } else {
        println!("\n{} issue(s): {}", issues.len(), issues.join(", "));
    }

    Ok(())
}

async fn handle_serve(config: Config) -> Result<()> {
    config.ensure_bootstrap_files()?;
    let _ = Database::open(&config.db_path)?;

    let shared_config = Arc::new(config);
    info!(port = shared_config.api_port, "Vices service started");

    tokio::select! {
        api_result = api::run_server(Arc::clone(&shared_config)) => {
            api_result?;
        }
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}

/// State for a fresh sign-in: the only place default streaks are created.
fn sign_in_state(database: Database, session: Session) -> Result<AppState<Database>> {
    let mut state = AppState::new(database, Some(session));
    let created = state.ensure_default_streaks()?;
    if created > 0 {
        println!("Started {created} streaks with a {}-day goal.", Goal::DEFAULT);
    }
    state.start()?;
    Ok(state)
}

fn start_state(database: Database, session: Session) -> Result<AppState<Database>> {
    let mut state = AppState::new(database, Some(session));
    state.start()?;
    Ok(state)
}

fn signed_in_state() -> Result<(Config, AppState<Database>)> {
    let config = load_config()?;
    let database = Database::open(&config.db_path)?;
    let auth = Authenticator::restore(&database, config.session_path.clone())?;
    let session = auth
        .current_session()
        .cloned()
        .context("Not signed in. Run `vices login` first.")?;

    let state = start_state(database, session)?;
    Ok((config, state))
}

fn require_subscription(config: &Config, state: &AppState<Database>) -> Result<()> {
    let owner_id = state
        .session()
        .map(|session| session.user_id)
        .context("Not signed in. Run `vices login` first.")?;
    billing::require_active_subscription(config, owner_id)
}

fn print_streak_list(streaks: &[Streak]) {
    if streaks.is_empty() {
        println!("No active streaks. Create one with `vices create <smoking|drinking|porn>`.");
        return;
    }

    for streak in streaks {
        let next = next_milestone(&streak.milestones)
            .map(|milestone| format!("next: {} (day {})", milestone.title, milestone.day_count))
            .unwrap_or_else(|| "all milestones reached".to_string());
        println!(
            "#{} {} {:<12} {:>3}/{:<3} days {:>3}%  {}",
            streak.id,
            streak.kind.icon(),
            streak.kind.display_name(),
            streak.current_streak,
            streak.goal,
            streak.progress(),
            next
        );
    }
}

fn print_customer_info(info: &CustomerInfo) {
    println!(
        "- subscriber: {}",
        if is_active_subscriber(info) {
            "active"
        } else {
            "inactive"
        }
    );
    for (name, entitlement) in &info.entitlements {
        let expires = entitlement
            .expires_date
            .map(|at| at.with_timezone(&Local).format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "- {name}: {} ({}, expires {expires})",
            if entitlement.is_active { "active" } else { "expired" },
            entitlement.product_identifier
        );
    }
    if let Some(url) = &info.management_url {
        println!("- manage: {url}");
    }
}

fn parse_optional_date(input: Option<String>) -> Result<NaiveDate> {
    input
        .as_deref()
        .map(|date| {
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("Invalid date format: {date}. Example: 2025-03-01"))
        })
        .transpose()?
        .map_or_else(|| Ok(Local::now().date_naive()), Ok)
}

fn load_or_default_config() -> Result<Config> {
    Config::load().or_else(|_| {
        let config = Config::default();
        config.ensure_bootstrap_files()?;
        config.save()?;
        Ok(config)
    })
}

fn load_config() -> Result<Config> {
    Config::load().with_context(|| "Config file not found. Run `vices onboard` first.".to_string())
}
