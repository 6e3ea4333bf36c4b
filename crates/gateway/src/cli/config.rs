use sa_domain::config::{Config, ConfigSeverity};

/// Look up the `service`/`account` keychain coordinates configured for a
/// provider, erroring out if the provider isn't in `keychain` auth mode.
fn keychain_coords<'a>(config: &'a Config, provider_id: &str) -> anyhow::Result<(&'a str, &'a str)> {
    let provider = config
        .llm
        .providers
        .iter()
        .find(|p| p.id == provider_id)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "provider '{}' not found in config (available: {})",
                provider_id,
                config
                    .llm
                    .providers
                    .iter()
                    .map(|p| p.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            )
        })?;

    match (&provider.auth.service, &provider.auth.account) {
        (Some(service), Some(account)) => Ok((service.as_str(), account.as_str())),
        _ => anyhow::bail!(
            "provider '{}' has no 'service'/'account' configured for auth — \
             set both in config.toml to use the OS keychain",
            provider_id
        ),
    }
}

/// Parse and validate the config, printing any issues.
///
/// Exits with code 0 when valid, code 1 when errors are found.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();

    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }

    println!(
        "\n{} error(s), {} warning(s) in {config_path}",
        error_count, warning_count,
    );

    error_count == 0
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Failed to serialize config: {e}");
            std::process::exit(1);
        }
    }
}

/// Prompt for a secret and store it in the OS keychain under the
/// `service`/`account` coordinates configured for `provider_id`.
pub fn set_secret(config: &Config, provider_id: &str) -> anyhow::Result<()> {
    let (service, account) = keychain_coords(config, provider_id)?;

    let secret = rpassword::prompt_password(format!("API key for '{provider_id}': "))?;
    if secret.is_empty() {
        anyhow::bail!("no key entered, aborting");
    }

    let entry = keyring::Entry::new(service, account)?;
    entry.set_password(&secret)?;

    println!("Stored API key for '{provider_id}' in the OS keychain ({service}/{account}).");
    Ok(())
}

/// Read a secret from the OS keychain and print it masked (last 4 chars visible).
pub fn get_secret(config: &Config, provider_id: &str) -> anyhow::Result<()> {
    let (service, account) = keychain_coords(config, provider_id)?;

    let entry = keyring::Entry::new(service, account)?;
    let secret = entry
        .get_password()
        .map_err(|e| anyhow::anyhow!("no key found for '{provider_id}' ({service}/{account}): {e}"))?;

    let masked = if secret.len() > 4 {
        format!("{}{}", "*".repeat(secret.len() - 4), &secret[secret.len() - 4..])
    } else {
        "*".repeat(secret.len())
    };

    println!("{provider_id} ({service}/{account}): {masked}");
    Ok(())
}
