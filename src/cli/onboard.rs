use crate::app::AppState;
use crate::auth::{Authenticator, Session};
use crate::config::{Config, default_report_dir, expand_home};
use crate::db::Database;
use crate::streak::HabitKind;
use anyhow::{Context, Result};
use dialoguer::{Input, MultiSelect, Password, Select, theme::ColorfulTheme};

pub fn run_onboarding(mut config: Config) -> Result<Config> {
    println!("──────────────────────────────────────────");
    println!("  Welcome to Vices.");
    println!("  Break the habit one day at a time.");
    println!("──────────────────────────────────────────");

    let theme = ColorfulTheme::default();

    println!("\n[1/4] Report output directory");
    let report_dir_input: String = Input::with_theme(&theme)
        .with_prompt("  Folder where progress reports will be saved")
        .default(default_report_dir().display().to_string())
        .interact_text()
        .context("Failed to read report directory")?;
    config.report_dir = expand_home(&report_dir_input);
    config.ensure_bootstrap_files()?;
    config.save()?;
    println!("  ✓ {}", config.report_dir.display());

    let database = Database::open(&config.db_path)?;
    let mut auth = Authenticator::restore(&database, config.session_path.clone())?;

    println!("\n[2/4] Account");
    let session = match auth.current_session().cloned() {
        Some(session) => {
            println!("  ✓ Already signed in as {}", session.email);
            session
        }
        None => sign_up_or_in(&theme, &database, &mut auth)?,
    };

    println!("\n[3/4] Choose your vices");
    let vices = select_vices(&theme)?;
    println!(
        "  ✓ {}",
        vices
            .iter()
            .map(|kind| kind.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    println!("\n[4/4] Setting up your streaks");
    let mut state = AppState::new(database, Some(session));
    state.update_profile(None, Some(&vices[..]))?;
    state.ensure_default_streaks()?;
    state.start()?;
    for streak in state.streaks() {
        println!(
            "  ✓ #{} {} {} (goal: {} days)",
            streak.id,
            streak.kind.icon(),
            streak.kind.display_name(),
            streak.goal
        );
    }

    println!("\n──────────────────────────────────────────");
    println!("  Onboarding complete!");
    println!("  Run `vices confirm <id>` each day you stay clean.");
    println!("  Run `vices status` to check your progress.");
    println!("──────────────────────────────────────────");

    Ok(config)
}

fn sign_up_or_in(
    theme: &ColorfulTheme,
    database: &Database,
    auth: &mut Authenticator,
) -> Result<Session> {
    let choice = Select::with_theme(theme)
        .with_prompt("  Do you have an account?")
        .default(0)
        .items(&["Create a new account", "Sign in"])
        .interact()
        .context("Failed to read account choice")?;

    let email = prompt_email(theme)?;
    if choice == 0 {
        let name: String = Input::with_theme(theme)
            .with_prompt("  Name")
            .interact_text()
            .context("Failed to read name")?;
        let password = prompt_new_password(theme)?;
        auth.sign_up(database, &email, &password, &name)?;
        println!("  ✓ Account created");
        return Ok(auth.sign_in(database, &email, &password)?);
    }

    let password = prompt_password(theme)?;
    let session = auth.sign_in(database, &email, &password)?;
    println!("  ✓ Signed in as {}", session.email);

    Ok(session)
}

fn select_vices(theme: &ColorfulTheme) -> Result<Vec<HabitKind>> {
    let labels = HabitKind::ALL
        .iter()
        .map(|kind| format!("{} {}", kind.icon(), kind.display_name()))
        .collect::<Vec<_>>();

    loop {
        let picked = MultiSelect::with_theme(theme)
            .with_prompt("  Select the vices you want to quit (space to toggle)")
            .items(&labels)
            .defaults(&[true, false, false])
            .interact()
            .context("Failed to read vice selection")?;

        if picked.is_empty() {
            println!("  ! Please select at least one vice to continue.");
            continue;
        }

        return Ok(picked
            .into_iter()
            .filter_map(|index| HabitKind::ALL.get(index).copied())
            .collect());
    }
}

pub fn prompt_email(theme: &ColorfulTheme) -> Result<String> {
    Input::with_theme(theme)
        .with_prompt("  Email")
        .validate_with(|input: &String| -> std::result::Result<(), &str> {
            if input.contains('@') {
                Ok(())
            } else {
                Err("Enter a valid email address")
            }
        })
        .interact_text()
        .context("Failed to read email")
}

pub fn prompt_password(theme: &ColorfulTheme) -> Result<String> {
    Password::with_theme(theme)
        .with_prompt("  Password")
        .interact()
        .context("Failed to read password")
}

pub fn prompt_new_password(theme: &ColorfulTheme) -> Result<String> {
    Password::with_theme(theme)
        .with_prompt("  Password")
        .with_confirmation("  Confirm password", "Passwords do not match")
        .interact()
        .context("Failed to read password")
}
