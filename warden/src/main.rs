// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

mod bridge;
mod capabilities;
mod cli;
mod context;
mod jail;
mod signals;
mod supervisor;
mod user;
mod visitation;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use cliutil::{cli_main, ConfigBuilder};
use nix::unistd::ForkResult;
use tracing::{info, info_span, warn};

use crate::cli::Cli;
use crate::context::{JailContext, JailContextBuilder, DEFAULT_MOUNT_TEMPLATE};

fn do_main() -> Result<()> {
    let cli = Cli::parse();
    cli.validate()?;

    let mut ctx = JailContextBuilder::new()
        .config_path(cli.config)
        .user(cli.user)
        .group(cli.group)
        .attach(cli.attach)
        .argv(cli.argv)
        .build()?;

    if ctx.do_attach {
        let _span = info_span!("attach").entered();
        return visitation::run_visitation(&ctx.stdin_path(), &ctx.stdout_path());
    }

    let user = ctx
        .user
        .clone()
        .context("-u/--user is required to build a jail")?;

    jail::create_stdio_for_prisoner(&ctx.config, user.uid, user.gid)
        .context("failed to create stdio FIFOs")?;

    // SAFETY: the child branch below only performs the privileged jail
    // construction and prisoner-spawn sequence before either exiting itself
    // (daemon side) or execing a process (deep inside `supervisor::spawn`'s
    // own fork); it does not touch any state shared with the parent beyond
    // what fork() already copies.
    match unsafe { nix::unistd::fork() }.context("fork failed")? {
        ForkResult::Child => {
            let exit_code = run_daemon(&mut ctx);
            std::process::exit(exit_code);
        }
        ForkResult::Parent { child } => {
            info!(daemon_pid = child.as_raw(), "launched jail daemon");
            let _span = info_span!("visitation").entered();
            visitation::run_visitation(&ctx.stdin_path(), &ctx.stdout_path())
        }
    }
}

/// Runs in the forked daemon process: builds the jail, spawns and
/// supervises the prisoner, and tears the jail back down regardless of how
/// the supervision ended. Returns the process exit code for this process
/// (distinct from `warden`'s own exit code, which reflects the visitation
/// loop's result instead).
fn run_daemon(ctx: &mut JailContext) -> i32 {
    let result = build_and_supervise(ctx);
    jail::cleanup(ctx);
    match result {
        Ok(()) => 0,
        Err(err) => {
            warn!(?err, "jail daemon exited with error");
            1
        }
    }
}

fn build_and_supervise(ctx: &mut JailContext) -> Result<()> {
    let user = ctx
        .user
        .clone()
        .context("-u/--user is required to build a jail")?;

    let template = std::path::PathBuf::from(DEFAULT_MOUNT_TEMPLATE);
    let mount_point = {
        let _span = info_span!("create_jail").entered();
        jail::create_jail(&template, user.uid, user.gid)?
    };
    ctx.mount_point = Some(mount_point.clone());

    {
        let _span = info_span!("build_rootfs").entered();
        ctx.bind_entries = jail::build_rootfs(&mount_point, &ctx.config, user.uid, user.gid)?;
    }

    let master = {
        let _span = info_span!("spawn").entered();
        supervisor::spawn(ctx)?
    };

    let _span = info_span!("bridge").entered();
    supervisor::run_bridge(ctx, master)
}

fn main() -> ExitCode {
    cli_main(
        do_main,
        ConfigBuilder::new().build().expect("valid cliutil config"),
    )
}
