//! Bounty commands

use crate::style::*;
use anyhow::{bail, Result};
use bounty_platform::models::{Bounty, BountyId, BountyState};
use bounty_platform::Platform;
use colored::{ColoredString, Colorize};

fn state_label(state: BountyState) -> ColoredString {
    match state {
        BountyState::Open => "open".green(),
        BountyState::Released => "released".yellow(),
        BountyState::Transferred => "transferred".dimmed(),
    }
}

pub async fn list(platform: &Platform, repo: Option<&str>) -> Result<()> {
    let bounties = match repo {
        Some(full_name) => {
            let Some((owner, name)) = full_name.split_once('/') else {
                bail!("expected <owner>/<name>, got '{}'", full_name);
            };
            print_header(&format!("Bounties of {}", full_name));
            platform.bounties.list_for_repo(owner, name)?
        }
        None => {
            print_header("Bounties");
            platform.bounties.list_all()?
        }
    };

    if bounties.is_empty() {
        print_warning("No bounties found.");
        return Ok(());
    }

    println!(
        "{:<12} {:<8} {:<12} {:>14}  {}",
        "ID".bold(),
        "ISSUE".bold(),
        "STATE".bold(),
        "BALANCE".bold(),
        "TITLE".bold()
    );
    for bounty in bounties {
        println!(
            "{:<12} {:<8} {:<12} {:>14}  {}",
            bounty.id,
            format!("#{}", bounty.issue_number),
            state_label(bounty.state),
            bounty.balance,
            bounty.title
        );
    }
    Ok(())
}

pub async fn add(platform: &Platform, owner: &str, name: &str, issue: u32) -> Result<()> {
    let _guard = platform.lock.acquire().await;

    let bounty = platform.bounties.create(owner, name, issue).await?;
    print_success(&format!(
        "Bounty {} created for {}/{}#{}",
        bounty.id, owner, name, bounty.issue_number
    ));
    println!("  Deposit address: {}", bounty.pool_address.cyan());
    Ok(())
}

pub async fn show(platform: &Platform, id: BountyId) -> Result<()> {
    let bounty = platform.bounties.get(id)?;
    let repo = platform.bounties.repository_of(id)?;
    print_details(&bounty, &repo.full_name());
    Ok(())
}

fn print_details(bounty: &Bounty, repository: &str) {
    print_header(&format!("Bounty {}", bounty.id));
    println!("Issue:        {}#{} {}", repository, bounty.issue_number, bounty.title.bold());
    println!("URL:          {}", bounty.url.dimmed());
    println!("State:        {}", state_label(bounty.state));
    println!("Balance:      {}", bounty.balance.to_string().bold());
    println!("Pool address: {}", truncate_trytes(&bounty.pool_address));
    if bounty.has_receiver() {
        println!("Receiver id:  {}", bounty.receiver_id);
    }
    if !bounty.receiver_address.is_empty() {
        println!("Paid to:      {}", truncate_trytes(&bounty.receiver_address));
    }
    if !bounty.bundle_hash.is_empty() {
        println!("Bundle:       {}", bounty.bundle_hash);
    }
    println!("Created:      {}", bounty.created_at.format("%Y-%m-%d %H:%M UTC"));
}

pub async fn delete(platform: &Platform, id: BountyId) -> Result<()> {
    let _guard = platform.lock.acquire().await;

    let bounty = platform.bounties.delete(id).await?;
    print_success(&format!("Deleted bounty {} (issue #{})", bounty.id, bounty.issue_number));
    if bounty.state != BountyState::Transferred && bounty.balance > 0 {
        print_warning(&format!(
            "{} was still held by the pool address {}",
            bounty.balance, bounty.pool_address
        ));
    }
    Ok(())
}
