use diesel::prelude::*;

use super::schema::{inner, leaf, node, orphan};

/// A row of the `node` table: every digest the store has ever seen,
/// with `root_version` set iff that digest was (or still is) bound as a
/// committed root (spec §6).
#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = node)]
pub struct NodeRow {
    pub hash: String,
    pub root_version: Option<i64>,
}

/// A row of the `leaf` table.
#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = leaf)]
pub struct LeafRow {
    pub hash: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub version: i64,
}

/// A row of the `inner` table. `left`/`right` are the hex digests of the
/// children, resolved through `node` on read (spec §5's lazy
/// materialization: an inner node loaded from storage starts out holding
/// only these digests).
#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = inner)]
pub struct InnerRow {
    pub hash: String,
    pub key: Vec<u8>,
    pub height: i32,
    pub size: i64,
    pub left: String,
    pub right: String,
    pub version: i64,
}

/// A row of the `orphan` table: `until` is the death version (spec
/// §4.5); the birth version is read back through `leaf.version`/
/// `inner.version` by joining on `hash`.
#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = orphan)]
pub struct OrphanRow {
    pub hash: String,
    pub until: i64,
}
