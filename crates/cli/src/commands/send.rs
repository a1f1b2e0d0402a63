// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `chorus send <content>` - Submit a message for broadcast

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use chorus_core::IdempotencyToken;
use clap::Args;

use crate::client;

#[derive(Args)]
pub struct SendArgs {
    /// Message content
    pub content: String,

    /// Idempotency token; reuse one from a failed send to retry it safely
    #[arg(long)]
    pub token: Option<String>,

    /// Seconds to keep retrying before giving up
    #[arg(long, default_value = "30")]
    pub timeout: u64,
}

pub async fn handle(args: SendArgs, addr: SocketAddr) -> Result<()> {
    let token = match args.token {
        Some(token) => IdempotencyToken::new(token),
        None => IdempotencyToken::new(uuid::Uuid::new_v4().to_string()),
    };

    client::submit(
        addr,
        &token,
        &args.content,
        Duration::from_secs(args.timeout),
    )
    .await?;

    println!("Sent (token: {})", token);
    Ok(())
}
