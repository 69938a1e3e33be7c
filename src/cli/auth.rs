//! Out of band authorization for headless setups: prints the consent
//! URL, takes the pasted code, and leaves a credential token in the
//! same cache the server reads.

use std::io::{self, Write};

use anyhow::Result;

use crate::auth::{AuthStore, Credentials};
use crate::core::AppConfig;
use crate::google::oauth;

pub async fn run() -> Result<()> {
    let config = AppConfig::default();
    let store = AuthStore::open(&config.cache_path);

    let state_token = store.begin_auth()?;
    let auth_url = oauth::authorization_url(
        &config.google_client_id,
        &config.google_redirect_uri,
        &state_token,
    );
    println!(
        "\nPlease open the following URL in your browser and authorize access:\n\n{}\n",
        auth_url
    );

    print!("Paste the authorization code shown by Google here: ");
    io::stdout().flush().unwrap();
    let mut code = String::new();
    io::stdin()
        .read_line(&mut code)
        .expect("Failed to read code");
    let code = code.trim();

    store.redeem_state(&state_token)?;
    let token = oauth::exchange_code_for_token(
        &config.google_client_id,
        &config.google_client_secret,
        code,
        &config.google_redirect_uri,
        &config.google_token_uri,
    )
    .await?;

    let scopes = token
        .scope
        .map(|scope| scope.split(' ').map(String::from).collect())
        .unwrap_or_else(|| vec![oauth::CALENDAR_SCOPE.to_string()]);
    let credential_token = store.issue_credentials(Credentials {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        token_uri: config.google_token_uri.clone(),
        client_id: config.google_client_id.clone(),
        client_secret: config.google_client_secret.clone(),
        scopes,
    })?;

    println!("Credential token (pass it to the chat API): {}", credential_token);
    Ok(())
}
