use super::explain;
use crate::core::config::AppConfig;
use crate::wallet::WalletService;
use anyhow::Result;

pub fn register(config: &AppConfig, username: &str, password: &str) -> Result<()> {
    let service = WalletService::from_config(config)?;
    let user = service.register(username, password).map_err(explain)?;
    println!(
        "User '{}' registered (id={}). Log in with: login --username {} --password ****",
        user.username, user.user_id, user.username
    );
    Ok(())
}

pub fn login(config: &AppConfig, username: &str, password: &str) -> Result<()> {
    let service = WalletService::from_config(config)?;
    let session = service.login(username, password).map_err(explain)?;
    println!("Logged in as '{}'", session.username);
    Ok(())
}

pub fn logout(config: &AppConfig) -> Result<()> {
    WalletService::from_config(config)?.logout()?;
    println!("Logged out");
    Ok(())
}
