use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{ContentArtifact, MANIFEST_VERSION};
use crate::util::{ensure_directory, now_utc_string};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReceipt {
    pub manifest_version: u32,
    pub document: String,
    pub edition: String,
    pub structure_version: u32,
    pub content_sha256: String,
    pub db_path: String,
    pub imported_at: String,
    pub replaced_existing: bool,
    pub division_count: usize,
    pub article_count: usize,
    pub paragraph_count: usize,
}

pub fn open_database(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;
    Ok(())
}

pub fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
        CREATE TABLE IF NOT EXISTS documents (
          code TEXT PRIMARY KEY,
          name TEXT NOT NULL,
          kind TEXT NOT NULL,
          edition TEXT NOT NULL,
          published_on TEXT,
          amended_on TEXT,
          structure_version INTEGER NOT NULL,
          content_sha256 TEXT NOT NULL,
          imported_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS divisions (
          document_code TEXT NOT NULL,
          division_key TEXT NOT NULL,
          parent_key TEXT,
          kind TEXT NOT NULL,
          number TEXT NOT NULL,
          name TEXT NOT NULL,
          order_index INTEGER NOT NULL,
          PRIMARY KEY(document_code, division_key),
          FOREIGN KEY(document_code) REFERENCES documents(code)
        );

        CREATE TABLE IF NOT EXISTS articles (
          document_code TEXT NOT NULL,
          article_id TEXT NOT NULL,
          raw_identifier TEXT NOT NULL,
          base_number INTEGER,
          title TEXT,
          intro TEXT NOT NULL,
          is_transitional INTEGER NOT NULL,
          transitional_block INTEGER,
          division_key TEXT,
          order_index INTEGER NOT NULL,
          page_start INTEGER NOT NULL,
          page_end INTEGER NOT NULL,
          amendments_json TEXT NOT NULL,
          content_unverified INTEGER NOT NULL,
          similarity REAL,
          PRIMARY KEY(document_code, article_id),
          FOREIGN KEY(document_code) REFERENCES documents(code)
        );

        CREATE TABLE IF NOT EXISTS paragraphs (
          document_code TEXT NOT NULL,
          article_id TEXT NOT NULL,
          paragraph_id INTEGER NOT NULL,
          parent_id INTEGER,
          kind TEXT NOT NULL,
          label TEXT NOT NULL,
          text TEXT NOT NULL,
          depth INTEGER NOT NULL,
          PRIMARY KEY(document_code, article_id, paragraph_id),
          FOREIGN KEY(document_code, article_id) REFERENCES articles(document_code, article_id)
        );

        CREATE INDEX IF NOT EXISTS idx_articles_division ON articles(document_code, division_key);
        ",
        )
        .context("failed to create staging schema")?;
    Ok(())
}

pub fn document_exists(connection: &Connection, code: &str) -> Result<bool> {
    let found = connection
        .query_row("SELECT 1 FROM documents WHERE code = ?1", params![code], |_| Ok(()))
        .optional()
        .context("failed to look up document")?;
    Ok(found.is_some())
}

pub fn article_count(connection: &Connection, code: &str) -> Result<i64> {
    let count = connection.query_row(
        "SELECT COUNT(*) FROM articles WHERE document_code = ?1",
        params![code],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn delete_document(tx: &Transaction<'_>, code: &str) -> Result<()> {
    for sql in [
        "DELETE FROM paragraphs WHERE document_code = ?1",
        "DELETE FROM articles WHERE document_code = ?1",
        "DELETE FROM divisions WHERE document_code = ?1",
        "DELETE FROM documents WHERE code = ?1",
    ] {
        tx.execute(sql, params![code])
            .with_context(|| format!("failed to clear previous rows for {code}"))?;
    }
    Ok(())
}

/// Writes one validated content artifact in a single transaction. An
/// already-loaded document aborts unless `replace_existing` is set.
pub fn load_content(
    connection: &mut Connection,
    content: &ContentArtifact,
    content_sha256: &str,
    replace_existing: bool,
) -> Result<(usize, usize, usize)> {
    let code = content.document.code.as_str();
    let exists = document_exists(connection, code)?;
    if exists && !replace_existing {
        bail!("document {code} is already loaded; pass --replace-existing to replace it");
    }

    let tx = connection.transaction()?;
    if exists {
        delete_document(&tx, code)?;
    }

    let meta = &content.document;
    tx.execute(
        "
        INSERT INTO documents(code, name, kind, edition, published_on, amended_on, structure_version, content_sha256, imported_at)
        VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ",
        params![
            meta.code,
            meta.name,
            meta.kind.as_str(),
            meta.edition,
            meta.published_on,
            meta.amended_on,
            content.structure_version,
            content_sha256,
            now_utc_string()
        ],
    )?;

    let mut paragraph_count = 0usize;
    {
        let mut division_statement = tx.prepare(
            "
            INSERT INTO divisions(document_code, division_key, parent_key, kind, number, name, order_index)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )?;
        for division in &content.divisions {
            division_statement.execute(params![
                code,
                division.key,
                division.parent_key,
                division.kind.as_str(),
                division.number,
                division.name,
                division.order as i64
            ])?;
        }

        let mut article_statement = tx.prepare(
            "
            INSERT INTO articles(
              document_code, article_id, raw_identifier, base_number, title, intro,
              is_transitional, transitional_block, division_key, order_index,
              page_start, page_end, amendments_json, content_unverified, similarity
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ",
        )?;
        let mut paragraph_statement = tx.prepare(
            "
            INSERT INTO paragraphs(document_code, article_id, paragraph_id, parent_id, kind, label, text, depth)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )?;

        for article in &content.articles {
            let amendments = serde_json::to_string(&article.amendments)
                .context("failed to serialize amendment notes")?;
            article_statement
                .execute(params![
                    code,
                    article.id,
                    article.raw_identifier,
                    article.number.as_ref().map(|number| number.base),
                    article.title,
                    article.intro,
                    article.is_transitional,
                    article.transitional_block,
                    article.division_key,
                    article.order as i64,
                    article.page_start,
                    article.page_end,
                    amendments,
                    article.content_unverified,
                    article.similarity
                ])
                .with_context(|| format!("failed to insert article {}", article.id))?;

            for node in &article.paragraphs {
                paragraph_statement.execute(params![
                    code,
                    article.id,
                    node.id as i64,
                    node.parent.map(|parent| parent as i64),
                    node.kind.as_str(),
                    node.label,
                    node.text,
                    node.depth as i64
                ])?;
                paragraph_count += 1;
            }
        }
    }

    tx.commit()?;

    info!(
        document = %code,
        replaced = exists,
        divisions = content.divisions.len(),
        articles = content.articles.len(),
        paragraphs = paragraph_count,
        "content loaded into staging database"
    );

    Ok((content.divisions.len(), content.articles.len(), paragraph_count))
}

pub fn import_content(
    db_path: &Path,
    content: &ContentArtifact,
    content_sha256: &str,
    replace_existing: bool,
) -> Result<ImportReceipt> {
    let mut connection = open_database(db_path)?;
    let replaced_existing = document_exists(&connection, &content.document.code)?;
    let (division_count, article_count, paragraph_count) =
        load_content(&mut connection, content, content_sha256, replace_existing)?;

    Ok(ImportReceipt {
        manifest_version: MANIFEST_VERSION,
        document: content.document.code.clone(),
        edition: content.document.edition.clone(),
        structure_version: content.structure_version,
        content_sha256: content_sha256.to_string(),
        db_path: db_path.display().to_string(),
        imported_at: now_utc_string(),
        replaced_existing,
        division_count,
        article_count,
        paragraph_count,
    })
}
