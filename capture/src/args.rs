//! Command-line flags in the NVR tooling style: the value is glued to the
//! flag (`-s172.16.10.115 -uadmin -psecret`). Unknown flags are ignored.

use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Args {
    /// `-s<ip>`; `None` when absent or unparseable.
    pub address: Option<IpAddr>,
    /// `-u<user>`
    pub username: String,
    /// `-p<password>`
    pub password: String,
    /// `-c<path>` config file.
    pub config: Option<PathBuf>,
    /// `-d<path>` directory file, overrides `DIRECTORY_FILE`.
    pub directory: Option<PathBuf>,
    /// `-v`
    pub verbose: bool,
}

pub fn parse<I>(args: I) -> Args
where
    I: IntoIterator<Item = String>,
{
    let mut out = Args::default();
    for arg in args {
        let Some(rest) = arg.strip_prefix('-') else {
            continue;
        };
        let mut chars = rest.chars();
        let Some(flag) = chars.next() else {
            continue;
        };
        let value = chars.as_str();

        match (flag, value.is_empty()) {
            ('v', true) => out.verbose = true,
            (_, true) => {}
            ('s', false) => {
                if let Ok(address) = value.parse() {
                    out.address = Some(address);
                }
            }
            ('u', false) => out.username = value.to_string(),
            ('p', false) => out.password = value.to_string(),
            ('c', false) => out.config = Some(PathBuf::from(value)),
            ('d', false) => out.directory = Some(PathBuf::from(value)),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(line: &str) -> Args {
        parse(line.split_whitespace().map(String::from))
    }

    #[test]
    fn test_glued_values() {
        let a = parse_str("-s172.16.10.115 -uadmin -psecret -v");
        assert_eq!(a.address, Some("172.16.10.115".parse().unwrap()));
        assert_eq!(a.username, "admin");
        assert_eq!(a.password, "secret");
        assert!(a.verbose);
        assert!(a.config.is_none());
    }

    #[test]
    fn test_unparseable_address_is_absent() {
        assert_eq!(parse_str("-snvr.local -uadmin").address, None);
        assert_eq!(parse_str("-s").address, None);
        assert_eq!(parse_str("").address, None);
    }

    #[test]
    fn test_last_address_wins_and_unknown_flags_ignored() {
        let a = parse_str("-s10.0.0.1 -x42 plain -s10.0.0.2 -d/etc/dir.toml");
        assert_eq!(a.address, Some("10.0.0.2".parse().unwrap()));
        assert_eq!(a.directory, Some(PathBuf::from("/etc/dir.toml")));
    }
}
