//! Verifying that a pid belongs to a VPN client we launched

use crate::platform::ProcessTable;
use crate::profile::ProfileValidator;
use nix::unistd::Pid;
use tracing::debug;

/// True if `pid`'s argv contains `--config <profile>` for a valid profile path
///
/// Fails closed: a missing or unreadable record is never a client.
pub fn is_vpn_client_process(
    table: &dyn ProcessTable,
    validator: &ProfileValidator,
    pid: Pid,
) -> bool {
    let Some(args) = table.cmdline(pid) else {
        debug!("No command line record for pid {}", pid);
        return false;
    };
    has_profile_config(&args, validator)
}

pub fn has_profile_config(args: &[String], validator: &ProfileValidator) -> bool {
    args.windows(2)
        .any(|pair| pair[0] == "--config" && validator.is_valid_str(&pair[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stop::testing::MockProcessTable;

    const PROFILE: &str = "/home/alice/.config/pritunl_client/profiles/abc123.ovpn";

    fn validator() -> ProfileValidator {
        ProfileValidator::new("pritunl_client")
    }

    #[test]
    fn test_client_process_is_recognized() {
        let table = MockProcessTable::new(
            100,
            &["/usr/sbin/openvpn", "--config", PROFILE, "--auth-user-pass", "/tmp/c"],
        );
        assert!(is_vpn_client_process(&table, &validator(), Pid::from_raw(100)));
    }

    #[test]
    fn test_missing_record_is_not_a_client() {
        let table = MockProcessTable::absent(100);
        assert!(!is_vpn_client_process(&table, &validator(), Pid::from_raw(100)));
        assert!(!is_vpn_client_process(&table, &validator(), Pid::from_raw(101)));
    }

    #[test]
    fn test_unrelated_process_is_rejected() {
        let table = MockProcessTable::new(1, &["/sbin/init", "splash"]);
        assert!(!is_vpn_client_process(&table, &validator(), Pid::from_raw(1)));
    }

    #[test]
    fn test_profile_path_must_follow_config_flag() {
        let args: Vec<String> = ["sleep", PROFILE].iter().map(|s| s.to_string()).collect();
        assert!(!has_profile_config(&args, &validator()));

        let args: Vec<String> = ["vim", "--config"].iter().map(|s| s.to_string()).collect();
        assert!(!has_profile_config(&args, &validator()));
    }

    #[test]
    fn test_spoofed_profile_paths_are_rejected() {
        for path in [
            "/tmp/evil/profiles/abc.ovpn",
            "/home/a/pritunl_client/profiles/abc.ovpn.sh",
            "relative/pritunl_client/profiles/abc.ovpn",
            "/home/a/pritunl_client/profiles/../profiles/abc.ovpn",
        ] {
            let args = vec!["openvpn".to_string(), "--config".to_string(), path.to_string()];
            assert!(!has_profile_config(&args, &validator()), "accepted {}", path);
        }
    }

    #[test]
    fn test_empty_cmdline_is_rejected() {
        assert!(!has_profile_config(&[], &validator()));
    }
}
