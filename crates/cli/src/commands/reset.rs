//! `calsync reset` — Forget one post so it is processed again, or clear everything.

use std::io::{BufRead, Write};

use calsync_core::storage::DecisionStore;

use crate::wiring;

pub async fn run(post_id: Option<&str>, yes: bool) -> anyhow::Result<()> {
    let config = wiring::load_config()?;
    let store = wiring::open_store(&config).await?;

    match post_id {
        Some(id) => {
            if store.delete_post(id).await? {
                println!("Reset post: {id}");
            } else {
                println!("No record found for: {id}");
            }
        }
        None => {
            if !yes && !confirm("This will clear all processing history. Continue?")? {
                println!("Aborted");
                return Ok(());
            }
            let removed = store.clear().await?;
            println!("All history cleared ({removed} row(s))");
        }
    }
    Ok(())
}

fn confirm(prompt: &str) -> std::io::Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
