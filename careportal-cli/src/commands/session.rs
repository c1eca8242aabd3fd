use std::{
    io::{self, Write},
    path::Path,
    sync::Arc,
};

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use client::{
    GatewayError, PortalClient, SessionError, SessionIdentity, StaticSession, StoredSession,
    session_path,
};
use rpassword::prompt_password;
use shared::{config::client::Config, models::LoginRequest};

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Sign in and store the session token
    Login(LoginArgs),
    /// Show the signed-in user
    Whoami,
    /// Remove the stored session
    Logout,
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Portal username; prompted for when omitted
    #[arg(long, short)]
    pub username: Option<String>,
}

pub async fn run(command: SessionCommand, config: &Config) -> Result<()> {
    match command {
        SessionCommand::Login(args) => login(args, config).await,
        SessionCommand::Whoami => whoami(),
        SessionCommand::Logout => logout(),
    }
}

pub async fn login(args: LoginArgs, config: &Config) -> Result<()> {
    let path = session_path();

    let username = match args.username {
        Some(username) if !username.trim().is_empty() => username.trim().to_string(),
        _ => prompt("Username: ")?,
    };
    let password = prompt_password("Password: ")?;
    if password.trim().is_empty() {
        bail!("password must not be empty");
    }

    let client = PortalClient::from_config(config, Arc::new(StaticSession::anonymous()))?;
    let raw = match client.login(&LoginRequest { username, password }).await {
        Ok(raw) => raw,
        Err(GatewayError::Unauthorized) => bail!("login failed: invalid username or password"),
        Err(err) => return Err(anyhow::Error::new(err).context("login failed")),
    };

    let session = StoredSession::from_login_payload(&raw)?;
    session.save(&path)?;
    print_session_summary(&session, &path);
    Ok(())
}

pub fn whoami() -> Result<()> {
    let path = session_path();
    let session = match StoredSession::load(&path) {
        Ok(session) => session,
        Err(SessionError::NotFound(_)) => {
            bail!("no active session found; run `careportal session login` first")
        }
        Err(err) => return Err(err.into()),
    };
    print_session_summary(&session, &path);
    Ok(())
}

pub fn logout() -> Result<()> {
    let path = session_path();
    if StoredSession::clear(&path)? {
        println!("Removed session at {}", path.display());
    } else {
        println!("No session found at {}", path.display());
    }
    Ok(())
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush().ok();
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let trimmed = input.trim().to_string();
    if trimmed.is_empty() {
        bail!("input must not be empty");
    }
    Ok(trimmed)
}

fn print_session_summary(session: &StoredSession, path: &Path) {
    let name = session.username().unwrap_or_else(|| "(unknown)".to_string());
    println!("Signed in as {name}");
    if let Some(user_id) = session.user_id() {
        println!("User id: {user_id}");
    }
    if let Some(role) = session.role() {
        println!("Role: {}", role.label());
    }
    println!("Session stored at {}", path.display());
}
