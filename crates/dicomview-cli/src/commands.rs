use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{error, warn};

use dicomview_core::api::{ApiError, Credentials, SignupRequest};
use dicomview_core::auth::CredentialStore;
use dicomview_core::{AuthSession, Config};

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_password() -> Result<String> {
    let password = rpassword::prompt_password("Password: ")?;
    Ok(password)
}

fn prompt_username(config: &Config) -> Result<String> {
    match config.last_username {
        Some(ref last_user) => {
            let input = prompt(&format!("Username [{}]: ", last_user))?;
            Ok(if input.is_empty() { last_user.clone() } else { input })
        }
        None => prompt("Username: "),
    }
}

/// Password from the keychain if the user agrees, otherwise prompted.
fn resolve_password(keychain: Option<&CredentialStore>) -> Result<String> {
    let stored = keychain.and_then(|k| match k.recall() {
        Ok(password) => password,
        Err(e) => {
            warn!(error = %e, "Keychain unavailable");
            None
        }
    });

    if let Some(password) = stored {
        let answer = prompt("Use stored password? [Y/n]: ")?;
        if answer.to_lowercase() != "n" {
            return Ok(password);
        }
    }
    prompt_password()
}

fn remember_login(config: &mut Config, keychain: Option<&CredentialStore>, username: &str, password: &str) {
    if let Some(keychain) = keychain {
        if let Err(e) = keychain.remember(password) {
            warn!(error = %e, "Failed to store credentials");
        }
    }

    config.last_username = Some(username.to_string());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
}

fn login_failure_message(err: &ApiError) -> String {
    match err.status().map(|s| s.as_u16()) {
        Some(401) => "Invalid username or password".to_string(),
        Some(409) => "That username is already taken".to_string(),
        _ => err.to_string(),
    }
}

pub async fn login(api: &AuthSession, config: &mut Config, username: Option<&str>) -> Result<()> {
    let username = match username {
        Some(name) => name.to_string(),
        None => prompt_username(config)?,
    };
    if username.is_empty() {
        anyhow::bail!("Username required");
    }

    let keychain = CredentialStore::for_user(&username)
        .map_err(|e| warn!(error = %e, "Keychain unavailable"))
        .ok();
    let password = resolve_password(keychain.as_ref())?;

    println!("\nAuthenticating...");
    match api.login(&Credentials::new(username.clone(), password.clone())).await {
        Ok(auth) => {
            remember_login(config, keychain.as_ref(), &username, &password);
            let expires = auth.expires_at(chrono::Utc::now()).with_timezone(&Local);
            println!(
                "Logged in as {} ({}). Token valid until {}.",
                auth.display_name,
                auth.username,
                expires.format("%H:%M:%S")
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Login failed");
            anyhow::bail!(login_failure_message(&e))
        }
    }
}

pub async fn signup(api: &AuthSession, config: &mut Config, args: &[String]) -> Result<()> {
    let (username, display_name) = match args {
        [username, display_name, ..] => (username.clone(), display_name.clone()),
        _ => anyhow::bail!("signup requires <username> <display-name> [email]"),
    };
    let email = args.get(2).cloned();

    let password = prompt_password()?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }

    let request = SignupRequest {
        username: username.clone(),
        password,
        display_name,
        email,
    };

    let auth = api
        .signup(&request)
        .await
        .map_err(|e| anyhow::anyhow!(login_failure_message(&e)))?;

    config.last_username = Some(username);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Account created. Logged in as {} ({}).", auth.display_name, auth.username);
    Ok(())
}

pub async fn logout(api: &AuthSession, config: &Config, forget: bool) -> Result<()> {
    let username = api.user().username.or_else(|| config.last_username.clone());

    api.logout().await;

    if forget {
        if let Some(ref username) = username {
            let outcome = CredentialStore::for_user(username).and_then(|k| k.forget());
            if let Some(message) = forget_message(username, outcome) {
                println!("{}", message);
            }
        }
    }

    println!("Logged out.");
    Ok(())
}

/// The session is already gone by the time the keychain is touched, so a
/// keychain failure only warns.
fn forget_message(username: &str, outcome: Result<bool>) -> Option<String> {
    match outcome {
        Ok(true) => Some(format!("Removed stored password for {}.", username)),
        Ok(false) => None,
        Err(e) => {
            warn!(error = %e, username = %username, "Failed to remove stored password");
            Some(format!("Could not remove stored password for {}: {}", username, e))
        }
    }
}

pub fn whoami(api: &AuthSession) {
    let user = api.user();
    if !api.is_authenticated() {
        println!("Not logged in.");
        return;
    }
    println!(
        "{} ({})",
        user.display_name.as_deref().unwrap_or("-"),
        user.username.as_deref().unwrap_or("-")
    );
}

pub async fn get(api: &AuthSession, endpoint: &str) -> Result<()> {
    let body: serde_json::Value = api
        .get(endpoint)
        .await
        .with_context(|| format!("GET {} failed", endpoint))?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
