// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `chorus watch` - Stream broadcast messages

use std::fmt;
use std::net::SocketAddr;

use anyhow::Result;
use chorus_core::MessageId;
use clap::Args;
use serde::Serialize;

use crate::client::{self, WatchCursor};
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct WatchArgs {
    /// Only show messages with ids above this one
    #[arg(long)]
    pub since: Option<u64>,

    /// Exit after this many messages
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Serialize)]
struct MessageLine<'a> {
    id: u64,
    content: &'a str,
}

impl fmt::Display for MessageLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.content)
    }
}

pub async fn handle(args: WatchArgs, addr: SocketAddr, format: OutputFormat) -> Result<()> {
    if args.count == Some(0) {
        return Ok(());
    }

    let mut cursor = WatchCursor::since(args.since.map(MessageId::new));
    let mut printed = 0usize;

    client::watch(addr, &mut cursor, |id, content| {
        output::print(
            &MessageLine {
                id: id.get(),
                content,
            },
            format,
        );
        printed += 1;
        args.count.is_none_or(|count| printed < count)
    })
    .await?;

    Ok(())
}
