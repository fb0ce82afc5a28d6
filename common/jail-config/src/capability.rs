// Copyright 2026 The Warden Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The fixed Linux capability name → number table (`CAP_CHOWN` through
//! `CAP_WAKE_ALARM`), shared between config validation (here) and the raw
//! `capset`/`capget` sequence in `warden::capabilities`.

/// `(name, bit number)` in ascending bit order, matching `linux/capability.h`.
const TABLE: &[(&str, u64)] = &[
    ("CAP_CHOWN", 0),
    ("CAP_DAC_OVERRIDE", 1),
    ("CAP_DAC_READ_SEARCH", 2),
    ("CAP_FOWNER", 3),
    ("CAP_FSETID", 4),
    ("CAP_KILL", 5),
    ("CAP_SETGID", 6),
    ("CAP_SETUID", 7),
    ("CAP_SETPCAP", 8),
    ("CAP_LINUX_IMMUTABLE", 9),
    ("CAP_NET_BIND_SERVICE", 10),
    ("CAP_NET_BROADCAST", 11),
    ("CAP_NET_ADMIN", 12),
    ("CAP_NET_RAW", 13),
    ("CAP_IPC_LOCK", 14),
    ("CAP_IPC_OWNER", 15),
    ("CAP_SYS_MODULE", 16),
    ("CAP_SYS_RAWIO", 17),
    ("CAP_SYS_CHROOT", 18),
    ("CAP_SYS_PTRACE", 19),
    ("CAP_SYS_PACCT", 20),
    ("CAP_SYS_ADMIN", 21),
    ("CAP_SYS_BOOT", 22),
    ("CAP_SYS_NICE", 23),
    ("CAP_SYS_RESOURCE", 24),
    ("CAP_SYS_TIME", 25),
    ("CAP_SYS_TTY_CONFIG", 26),
    ("CAP_MKNOD", 27),
    ("CAP_LEASE", 28),
    ("CAP_AUDIT_WRITE", 29),
    ("CAP_AUDIT_CONTROL", 30),
    ("CAP_SETFCAP", 31),
    ("CAP_MAC_OVERRIDE", 32),
    ("CAP_MAC_ADMIN", 33),
    ("CAP_SYSLOG", 34),
    ("CAP_WAKE_ALARM", 35),
];

/// Resolves a capability name to its bit number, or `None` if unrecognized.
pub fn capability_number(name: &str) -> Option<u64> {
    TABLE
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, bit)| *bit)
}

/// The highest bit number this table knows about. Useful for bounding
/// probe-horizon tests without hardcoding `35` at every call site.
pub fn max_known_bit() -> u64 {
    TABLE.iter().map(|(_, bit)| *bit).max().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_names() {
        assert_eq!(capability_number("CAP_CHOWN"), Some(0));
        assert_eq!(capability_number("CAP_SYS_ADMIN"), Some(21));
        assert_eq!(capability_number("CAP_WAKE_ALARM"), Some(35));
    }

    #[test]
    fn rejects_unknown_names() {
        assert_eq!(capability_number("CAP_NOT_REAL"), None);
        assert_eq!(capability_number("cap_chown"), None);
    }

    #[test]
    fn max_known_bit_is_past_32() {
        assert!(max_known_bit() > 31);
    }
}
