//! Repository commands

use crate::style::*;
use anyhow::{bail, Result};
use bounty_platform::models::RepositoryId;
use bounty_platform::Platform;
use colored::Colorize;

pub async fn list(platform: &Platform) -> Result<()> {
    print_header("Tracked Repositories");

    let repos = platform.registry.list_all()?;
    if repos.is_empty() {
        print_warning("No repositories are tracked yet.");
        println!("  bounty repo add <owner>/<name>");
        return Ok(());
    }

    println!(
        "{:<12} {:<36} {}",
        "ID".bold(),
        "REPOSITORY".bold(),
        "URL".bold()
    );
    for repo in repos {
        println!(
            "{:<12} {:<36} {}",
            repo.id,
            repo.full_name().cyan(),
            repo.url.dimmed()
        );
    }
    Ok(())
}

/// `target` is either `owner/name` or a github.com URL.
pub async fn add(platform: &Platform, target: &str) -> Result<()> {
    let _guard = platform.lock.acquire().await;

    let repo = if target.contains("github.com") {
        platform.registry.add_via_url(target).await?
    } else {
        let Some((owner, name)) = target.split_once('/') else {
            bail!("expected <owner>/<name> or a GitHub URL, got '{}'", target);
        };
        platform.registry.add(owner, name).await?
    };

    print_success(&format!("Tracking {} (id {})", repo.full_name().cyan(), repo.id));
    if !repo.description.is_empty() {
        println!("  {}", repo.description.dimmed());
    }
    Ok(())
}

pub async fn delete(platform: &Platform, id: RepositoryId) -> Result<()> {
    let _guard = platform.lock.acquire().await;

    let deletion = platform.registry.delete(id).await?;
    print_success(&format!("Deleted {}", deletion.repository.full_name().cyan()));
    if deletion.bounties_deleted > 0 {
        println!("  {} bounties archived with it", deletion.bounties_deleted);
    }
    if deletion.bounties_failed > 0 {
        print_warning(&format!(
            "{} bounties couldn't be deleted and are still stored",
            deletion.bounties_failed
        ));
    }
    Ok(())
}
