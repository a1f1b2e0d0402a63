// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `chorus status` - Show daemon status

use std::fmt;
use std::net::SocketAddr;

use anyhow::Result;
use serde::Serialize;

use crate::client::{self, DaemonStatus};
use crate::output::{self, OutputFormat};

#[derive(Serialize)]
struct StatusView {
    addr: SocketAddr,
    uptime_secs: u64,
    sessions: usize,
    last_id: u64,
}

impl StatusView {
    fn new(addr: SocketAddr, status: DaemonStatus) -> Self {
        Self {
            addr,
            uptime_secs: status.uptime_secs,
            sessions: status.sessions,
            last_id: status.last_id.get(),
        }
    }
}

impl fmt::Display for StatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Daemon: running at {}", self.addr)?;
        writeln!(f, "  Uptime: {}s", self.uptime_secs)?;
        writeln!(f, "  Sessions: {}", self.sessions)?;
        write!(f, "  Last id: {}", self.last_id)
    }
}

pub async fn handle(addr: SocketAddr, format: OutputFormat) -> Result<()> {
    let status = client::status(addr).await?;
    output::print(&StatusView::new(addr, status), format);
    Ok(())
}
