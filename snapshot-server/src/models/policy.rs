use crate::models::source::SourceInfo;
use crate::policy::{Policy, PolicySet, PolicyTarget};
use rusqlite::{params, Connection};

// The global policy is keyed by the empty source.
fn target_key(target: &PolicyTarget) -> (&str, &str, &str) {
    match target {
        PolicyTarget::Global => ("", "", ""),
        PolicyTarget::Source(s) => (&s.host, &s.user_name, &s.path),
    }
}

pub fn get(conn: &Connection, target: &PolicyTarget) -> anyhow::Result<Option<Policy>> {
    let (host, username, path) = target_key(target);
    let mut stmt =
        conn.prepare("SELECT body FROM policies WHERE host = ? AND username = ? AND path = ?")?;
    let mut rows = stmt.query_map(params![host, username, path], |row| row.get::<_, String>(0))?;
    match rows.next() {
        Some(body) => Ok(Some(serde_json::from_str(&body?)?)),
        None => Ok(None),
    }
}

/// Store `policy` at `target`. An empty policy deletes the row.
pub fn set(conn: &Connection, target: &PolicyTarget, policy: &Policy) -> anyhow::Result<()> {
    let (host, username, path) = target_key(target);
    if policy.is_empty() {
        conn.execute(
            "DELETE FROM policies WHERE host = ? AND username = ? AND path = ?",
            params![host, username, path],
        )?;
        return Ok(());
    }

    let body = serde_json::to_string(policy)?;
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO policies (host, username, path, body, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(host, username, path) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        params![host, username, path, body, now],
    )?;
    Ok(())
}

pub fn load_all(conn: &Connection) -> anyhow::Result<PolicySet> {
    let mut stmt = conn.prepare("SELECT host, username, path, body FROM policies")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut set = PolicySet::default();
    for r in rows {
        let (host, username, path, body) = r?;
        let policy: Policy = serde_json::from_str(&body)?;
        let target = if host.is_empty() && username.is_empty() && path.is_empty() {
            PolicyTarget::Global
        } else {
            PolicyTarget::Source(SourceInfo::new(host, username, path))
        };
        set.set(target, policy);
    }
    Ok(set)
}
