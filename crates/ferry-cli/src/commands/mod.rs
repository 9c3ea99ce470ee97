//! CLI command implementations.

use anyhow::{Context, Result, bail};
use ferry_config::params;
use std::collections::HashMap;
use url::Url;

/// Parse `NAME=VALUE` arguments into repository parameters.
fn parse_params(raw: &[String]) -> Result<HashMap<String, String>> {
    raw.iter()
        .map(|entry| match entry.split_once('=') {
            Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
            _ => bail!("Invalid parameter '{}', expected NAME=VALUE", entry),
        })
        .collect()
}

pub fn validate(path: &str, raw_params: &[String]) -> Result<()> {
    let content = std::fs::read(path).with_context(|| format!("Failed to read {}", path))?;
    let params = parse_params(raw_params)?;

    let text = String::from_utf8_lossy(&content);
    for name in params::unresolved(&text, &params) {
        println!("warning: parameter $${} has no value", name);
    }

    match ferry_config::parse_build(&content, &params) {
        Ok(plan) => {
            println!("Configuration is valid");
            println!("  image:    {}", plan.image);
            println!("  commands: {}", plan.script.len());
            if !plan.services.is_empty() {
                println!("  services: {}", plan.services.join(", "));
            }
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

/// URL of the manual trigger route for `repo` (`host/owner/name`).
fn trigger_url(api_url: &str, repo: &str, hash: &str, branch: Option<&str>) -> Result<Url> {
    let segments: Vec<&str> = repo.trim_matches('/').split('/').collect();
    let [host, owner, name] = segments.as_slice() else {
        bail!("Repository must be given as host/owner/name, got '{}'", repo);
    };

    let base = Url::parse(api_url).with_context(|| format!("Invalid server URL: {}", api_url))?;
    let path = format!(
        "commit/{}/{}/{}/{}",
        urlencoding::encode(host),
        urlencoding::encode(owner),
        urlencoding::encode(name),
        urlencoding::encode(hash)
    );
    let mut url = base.join(&path)?;
    if let Some(branch) = branch {
        url.query_pairs_mut().append_pair("branch", branch);
    }
    Ok(url)
}

pub async fn trigger(api_url: &str, repo: &str, hash: &str, branch: Option<&str>) -> Result<()> {
    let url = trigger_url(api_url, repo, hash, branch)?;
    println!("Triggering {} at {}", repo, hash);

    let response = reqwest::get(url).await.context("Failed to reach the server")?;
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if !status.is_success() {
        bail!("Build failed ({}): {}", status, body);
    }

    println!("{}", body);
    Ok(())
}
