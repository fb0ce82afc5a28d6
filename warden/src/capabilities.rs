// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Capability-set reduction for the prisoner.
//!
//! `nix` does not wrap `capget`/`capset` or the `PR_CAPBSET_*`/
//! `PR_CAP_AMBIENT_*`/`PR_SET_SECUREBITS` `prctl` operations, so this module
//! goes through raw `libc::syscall`/`libc::prctl` directly.

use anyhow::{bail, Result};

const LINUX_CAPABILITY_VERSION_3: u32 = 0x20080522;

// Not exposed by the `libc` crate.
const SECBIT_NO_SETUID_FIXUP: u64 = 1 << 2;
const SECBIT_NO_SETUID_FIXUP_LOCKED: u64 = 1 << 3;
const SECBIT_KEEP_CAPS: u64 = 1 << 4;
const SECBIT_KEEP_CAPS_LOCKED: u64 = 1 << 5;

#[repr(C)]
struct CapUserHeader {
    version: u32,
    pid: i32,
}

#[repr(C)]
#[derive(Default, Clone, Copy)]
struct CapUserData {
    effective_lo: u32,
    permitted_lo: u32,
    inheritable_lo: u32,
    effective_hi: u32,
    permitted_hi: u32,
    inheritable_hi: u32,
}

impl CapUserData {
    fn permitted(&self) -> u64 {
        (self.permitted_lo as u64) | ((self.permitted_hi as u64) << 32)
    }

    fn inheritable(&self) -> u64 {
        (self.inheritable_lo as u64) | ((self.inheritable_hi as u64) << 32)
    }

    fn set_permitted(&mut self, bits: u64) {
        self.permitted_lo = bits as u32;
        self.permitted_hi = (bits >> 32) as u32;
    }

    fn set_inheritable(&mut self, bits: u64) {
        self.inheritable_lo = bits as u32;
        self.inheritable_hi = (bits >> 32) as u32;
    }

    fn set_effective(&mut self, bits: u64) {
        self.effective_lo = bits as u32;
        self.effective_hi = (bits >> 32) as u32;
    }
}

fn header() -> CapUserHeader {
    CapUserHeader {
        version: LINUX_CAPABILITY_VERSION_3,
        pid: 0,
    }
}

fn capget() -> Result<CapUserData> {
    let hdr = header();
    let mut data = CapUserData::default();
    let ret = unsafe { libc::syscall(libc::SYS_capget, &hdr as *const CapUserHeader, &mut data as *mut CapUserData) };
    if ret < 0 {
        bail!("capget failed: {}", std::io::Error::last_os_error());
    }
    Ok(data)
}

fn capset(data: &CapUserData) -> Result<()> {
    let hdr = header();
    let ret = unsafe { libc::syscall(libc::SYS_capset, &hdr as *const CapUserHeader, data as *const CapUserData) };
    if ret < 0 {
        bail!("capset failed: {}", std::io::Error::last_os_error());
    }
    Ok(())
}

/// Translates the configured `keep_capability` names into a bit set. Uses a
/// real 64-bit shift — capability numbers go past 31 on modern kernels, and
/// a 32-bit shift there would be undefined behavior.
fn keep_bits(keep_capability: &[String]) -> Result<u64> {
    let mut bits = 0u64;
    for name in keep_capability {
        let cap = jail_config::capability::capability_number(name)
            .ok_or_else(|| anyhow::anyhow!("unknown capability: {name:?}"))?;
        bits |= 1u64 << cap;
    }
    Ok(bits)
}

/// Drops every capability not named in `keep_capability` from the bounding
/// set, raises the kept ones as ambient capabilities, and locks secure bits
/// so the transition cannot be undone: once this returns, no later code in
/// this process can re-raise a dropped capability.
pub fn drop_capabilities(keep_capability: &[String]) -> Result<()> {
    let keep = keep_bits(keep_capability)?;

    let mut data = capget()?;
    let mut permitted = data.permitted();
    let mut inheritable = data.inheritable();

    let mut cap = 0i32;
    loop {
        let readable = unsafe { libc::prctl(libc::PR_CAPBSET_READ, cap, 0, 0, 0) };
        if readable < 0 {
            break;
        }

        if keep & (1u64 << cap) == 0 {
            let ret = unsafe { libc::prctl(libc::PR_CAPBSET_DROP, cap, 0, 0, 0) };
            if ret < 0 {
                bail!(
                    "PR_CAPBSET_DROP({cap}) failed: {}",
                    std::io::Error::last_os_error()
                );
            }
            permitted &= !(1u64 << cap);
        } else {
            let ret = unsafe { libc::prctl(libc::PR_CAP_AMBIENT, libc::PR_CAP_AMBIENT_RAISE, cap, 0, 0) };
            if ret < 0 {
                bail!(
                    "PR_CAP_AMBIENT_RAISE({cap}) failed: {}",
                    std::io::Error::last_os_error()
                );
            }
        }
        inheritable |= 1u64 << cap;

        cap += 1;
    }

    data.set_permitted(permitted);
    data.set_inheritable(inheritable);
    data.set_effective(permitted);
    capset(&data)?;

    let securebits = SECBIT_KEEP_CAPS
        | SECBIT_KEEP_CAPS_LOCKED
        | SECBIT_NO_SETUID_FIXUP
        | SECBIT_NO_SETUID_FIXUP_LOCKED;
    let ret = unsafe { libc::prctl(libc::PR_SET_SECUREBITS, securebits, 0, 0, 0) };
    if ret < 0 {
        bail!("PR_SET_SECUREBITS failed: {}", std::io::Error::last_os_error());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_bits_shifts_past_32_safely() {
        let bits = keep_bits(&["CAP_WAKE_ALARM".to_string()]).unwrap();
        assert_eq!(bits, 1u64 << 35);
    }

    #[test]
    fn keep_bits_rejects_unknown_names() {
        assert!(keep_bits(&["CAP_NOT_REAL".to_string()]).is_err());
    }

    #[test]
    fn keep_bits_combines_multiple_caps() {
        let bits = keep_bits(&["CAP_CHOWN".to_string(), "CAP_SYS_ADMIN".to_string()]).unwrap();
        assert_eq!(bits, (1u64 << 0) | (1u64 << 21));
    }
}
