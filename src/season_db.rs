use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use log::{debug, info};
use rusqlite::{Connection, Transaction, params};

use crate::position::Position;
use crate::season_csv::{self, SeasonSource};
use crate::season_data::{Club, GameweekStat, PlayerRecord, SeasonData, SeasonDataProvider};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub run_id: i64,
    pub season: String,
    pub clubs: usize,
    pub players: usize,
    pub gameweeks: usize,
    pub gameweek_rows: usize,
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS clubs (
            season TEXT NOT NULL,
            club_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            short_name TEXT NOT NULL,
            PRIMARY KEY (season, club_id)
        );

        CREATE TABLE IF NOT EXISTS players (
            season TEXT NOT NULL,
            player_id INTEGER NOT NULL,
            first_name TEXT NOT NULL,
            second_name TEXT NOT NULL,
            web_name TEXT NOT NULL,
            element_type INTEGER NOT NULL,
            club_id INTEGER NOT NULL,
            now_cost INTEGER NOT NULL,
            summary_json TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (season, player_id)
        );
        CREATE INDEX IF NOT EXISTS idx_players_club ON players(season, club_id);

        CREATE TABLE IF NOT EXISTS gameweek_stats (
            season TEXT NOT NULL,
            gameweek INTEGER NOT NULL,
            player_id INTEGER NOT NULL,
            points INTEGER NOT NULL,
            minutes INTEGER NOT NULL,
            value INTEGER NULL,
            fixtures INTEGER NOT NULL,
            PRIMARY KEY (season, gameweek, player_id)
        );

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            season TEXT NOT NULL,
            clubs INTEGER NOT NULL,
            players INTEGER NOT NULL,
            gameweek_rows INTEGER NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Replaces everything stored for `data`'s season in a single transaction.
pub fn ingest_season(conn: &mut Connection, data: &SeasonData) -> Result<IngestSummary> {
    let season = data.season().to_string();
    let started_at = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO ingest_runs(started_at, finished_at, season, clubs, players, gameweek_rows)
         VALUES (?1, NULL, ?2, 0, 0, 0)",
        params![started_at, season],
    )
    .context("insert ingest run")?;
    let run_id = conn.last_insert_rowid();

    let tx = conn.transaction().context("begin ingest transaction")?;
    for table in ["clubs", "players", "gameweek_stats"] {
        tx.execute(&format!("DELETE FROM {table} WHERE season = ?1"), params![season])
            .with_context(|| format!("clear {table} for {season}"))?;
    }
    let mut clubs = 0usize;
    for club in data.clubs() {
        upsert_club(&tx, &season, club)?;
        clubs += 1;
    }
    let updated_at = Utc::now().to_rfc3339();
    let mut players = 0usize;
    for player in data.players() {
        upsert_player(&tx, &season, player, &updated_at)?;
        players += 1;
    }
    let gameweeks = data.gameweeks_loaded();
    let mut gameweek_rows = 0usize;
    for gameweek in &gameweeks {
        for (id, stat) in data.gameweek_rows(*gameweek) {
            upsert_gameweek_stat(&tx, &season, *gameweek, id, stat)?;
            gameweek_rows += 1;
        }
    }
    tx.commit().context("commit ingest transaction")?;

    let finished_at = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE ingest_runs
         SET finished_at = ?1, clubs = ?2, players = ?3, gameweek_rows = ?4
         WHERE run_id = ?5",
        params![
            finished_at,
            clubs as i64,
            players as i64,
            gameweek_rows as i64,
            run_id
        ],
    )
    .context("update ingest run")?;

    info!("stored season {season}: {players} players, {gameweek_rows} gameweek rows");
    Ok(IngestSummary {
        run_id,
        season,
        clubs,
        players,
        gameweeks: gameweeks.len(),
        gameweek_rows,
    })
}

fn upsert_club(tx: &Transaction<'_>, season: &str, club: &Club) -> Result<()> {
    tx.execute(
        "INSERT INTO clubs(season, club_id, name, short_name) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(season, club_id) DO UPDATE SET
            name = excluded.name,
            short_name = excluded.short_name",
        params![season, club.id as i64, club.name, club.short_name],
    )
    .with_context(|| format!("upsert club {}", club.id))?;
    Ok(())
}

fn upsert_player(
    tx: &Transaction<'_>,
    season: &str,
    player: &PlayerRecord,
    updated_at: &str,
) -> Result<()> {
    let summary_json =
        serde_json::to_string(&player.summary).context("serialize player summary")?;
    tx.execute(
        "INSERT INTO players(
            season, player_id, first_name, second_name, web_name,
            element_type, club_id, now_cost, summary_json, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(season, player_id) DO UPDATE SET
            first_name = excluded.first_name,
            second_name = excluded.second_name,
            web_name = excluded.web_name,
            element_type = excluded.element_type,
            club_id = excluded.club_id,
            now_cost = excluded.now_cost,
            summary_json = excluded.summary_json,
            updated_at = excluded.updated_at",
        params![
            season,
            player.id as i64,
            player.first_name,
            player.second_name,
            player.web_name,
            player.position.id() as i64,
            player.club as i64,
            player.now_cost as i64,
            summary_json,
            updated_at
        ],
    )
    .with_context(|| format!("upsert player {}", player.id))?;
    Ok(())
}

fn upsert_gameweek_stat(
    tx: &Transaction<'_>,
    season: &str,
    gameweek: u8,
    id: u32,
    stat: &GameweekStat,
) -> Result<()> {
    tx.execute(
        "INSERT INTO gameweek_stats(season, gameweek, player_id, points, minutes, value, fixtures)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(season, gameweek, player_id) DO UPDATE SET
            points = excluded.points,
            minutes = excluded.minutes,
            value = excluded.value,
            fixtures = excluded.fixtures",
        params![
            season,
            gameweek as i64,
            id as i64,
            stat.points as i64,
            stat.minutes as i64,
            stat.value.map(|v| v as i64),
            stat.fixtures as i64
        ],
    )
    .with_context(|| format!("upsert gw{gameweek} stat for player {id}"))?;
    Ok(())
}

pub fn load_season(conn: &Connection, season: &str) -> Result<SeasonData> {
    let mut data = SeasonData::new(season);

    let mut stmt = conn
        .prepare("SELECT club_id, name, short_name FROM clubs WHERE season = ?1 ORDER BY club_id")
        .context("prepare load clubs query")?;
    let rows = stmt
        .query_map(params![season], |row| {
            Ok(Club {
                id: row.get::<_, u32>(0)?,
                name: row.get(1)?,
                short_name: row.get(2)?,
            })
        })
        .context("query load clubs")?;
    for row in rows {
        data.insert_club(row.context("decode club row")?);
    }

    let mut stmt = conn
        .prepare(
            r#"
            SELECT player_id, first_name, second_name, web_name, element_type,
                   club_id, now_cost, summary_json
            FROM players
            WHERE season = ?1
            ORDER BY player_id
            "#,
        )
        .context("prepare load players query")?;
    let rows = stmt
        .query_map(params![season], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, u8>(4)?,
                row.get::<_, u32>(5)?,
                row.get::<_, u32>(6)?,
                row.get::<_, String>(7)?,
            ))
        })
        .context("query load players")?;
    for row in rows {
        let (id, first_name, second_name, web_name, element_type, club, now_cost, summary_json) =
            row.context("decode player row")?;
        let position = Position::from_element_type(element_type)
            .ok_or_else(|| anyhow!("player {id} has unknown element_type {element_type}"))?;
        let summary = serde_json::from_str(&summary_json)
            .with_context(|| format!("parse summary for player {id}"))?;
        data.insert_player(PlayerRecord {
            id,
            first_name,
            second_name,
            web_name,
            position,
            club,
            now_cost,
            summary,
        });
    }
    if data.player_count() == 0 {
        return Err(anyhow!("season {season} is not stored in the database"));
    }

    let mut stmt = conn
        .prepare(
            r#"
            SELECT gameweek, player_id, points, minutes, value, fixtures
            FROM gameweek_stats
            WHERE season = ?1
            "#,
        )
        .context("prepare load gameweek stats query")?;
    let rows = stmt
        .query_map(params![season], |row| {
            Ok((
                row.get::<_, u8>(0)?,
                row.get::<_, u32>(1)?,
                GameweekStat {
                    points: row.get(2)?,
                    minutes: row.get(3)?,
                    value: row.get(4)?,
                    fixtures: row.get(5)?,
                },
            ))
        })
        .context("query load gameweek stats")?;
    for row in rows {
        let (gameweek, id, stat) = row.context("decode gameweek stat row")?;
        data.set_gameweek_stat(gameweek, id, stat);
    }

    Ok(data)
}

pub fn list_seasons(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT DISTINCT season FROM players ORDER BY season")
        .context("prepare list seasons query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query list seasons")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode season row")?);
    }
    Ok(out)
}

/// Reads `season` from the database when it is stored there; otherwise loads
/// it from `source` and stores it for next time.
pub fn load_or_fetch(db_path: Option<&Path>, source: &SeasonSource, season: &str) -> Result<SeasonData> {
    let Some(db_path) = db_path else {
        return season_csv::load_season(source, season);
    };
    let mut conn = open_db(db_path)?;
    if list_seasons(&conn)?.iter().any(|s| s == season) {
        debug!("season {season} read from {}", db_path.display());
        return load_season(&conn, season);
    }
    let data = season_csv::load_season(source, season)?;
    ingest_season(&mut conn, &data)?;
    Ok(data)
}
