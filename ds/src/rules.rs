//! Domain block/allow rules

use rusqlite::{OptionalExtension, params};
use tracing::debug;

use crate::error::StoreError;
use crate::rows::DomainRuleRow;
use crate::store::{Store, now_iso};

impl Store {
    /// Insert or replace a domain rule
    pub async fn upsert_domain_rule(
        &self,
        domain: &str,
        rule: &str,
        reason: &str,
        risk: &str,
        cause_id: Option<&str>,
        note: Option<&str>,
    ) -> Result<(), StoreError> {
        debug!(%domain, %rule, %reason, "upsert_domain_rule: called");
        let conn = self.conn().await;
        conn.execute(
            "INSERT INTO domain_rules (domain, rule, reason, risk, cause_id, note, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(domain) DO UPDATE SET \
                 rule = excluded.rule, reason = excluded.reason, \
                 risk = excluded.risk, cause_id = excluded.cause_id, note = excluded.note",
            params![domain, rule, reason, risk, cause_id, note, now_iso()],
        )?;
        Ok(())
    }

    /// Remove any rule for a domain; returns whether a row was deleted
    pub async fn delete_domain_rule(&self, domain: &str) -> Result<bool, StoreError> {
        debug!(%domain, "delete_domain_rule: called");
        let conn = self.conn().await;
        let deleted = conn.execute("DELETE FROM domain_rules WHERE domain = ?1", params![domain])?;
        Ok(deleted > 0)
    }

    /// Fetch the rule for a domain, if any
    pub async fn get_domain_rule(&self, domain: &str) -> Result<Option<DomainRuleRow>, StoreError> {
        let conn = self.conn().await;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM domain_rules WHERE domain = ?1", DomainRuleRow::COLUMNS),
                params![domain],
                DomainRuleRow::from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// All block rules, for the status envelope
    pub async fn blocked_domains(&self) -> Result<Vec<DomainRuleRow>, StoreError> {
        let conn = self.conn().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM domain_rules WHERE rule = 'block' ORDER BY domain",
            DomainRuleRow::COLUMNS
        ))?;
        let rows = stmt.query_map([], DomainRuleRow::from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }
}
