//! System user resolution for privilege drop.

use std::collections::HashMap;
use std::path::Path;

use crate::collector::traits::FileSystem;

/// Resolved OS identity shell commands run as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

/// Parses `/etc/passwd` content into `name -> (uid, gid)`.
///
/// Comment lines, blank lines and entries with non-numeric ids are skipped.
pub fn parse_passwd(content: &str) -> HashMap<String, (u32, u32)> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() >= 4
            && let (Ok(uid), Ok(gid)) = (parts[2].parse::<u32>(), parts[3].parse::<u32>())
        {
            map.insert(parts[0].to_string(), (uid, gid));
        }
    }
    map
}

/// Resolves `user` (numeric uid first, then login name) from `/etc/passwd`.
pub fn resolve_principal(fs: &dyn FileSystem, user: &str) -> Option<Principal> {
    let content = fs.read_to_string(Path::new("/etc/passwd")).ok()?;
    let users = parse_passwd(&content);
    let user = user.trim();

    if let Ok(uid) = user.parse::<u32>()
        && let Some((name, &(uid, gid))) = users.iter().find(|(_, (u, _))| *u == uid)
    {
        return Some(Principal {
            name: name.clone(),
            uid,
            gid,
        });
    }

    users.get(user).map(|&(uid, gid)| Principal {
        name: user.to_string(),
        uid,
        gid,
    })
}
