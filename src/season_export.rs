use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::season::{GameweekRecord, SeasonState};
use crate::season_data::{SeasonDataProvider, format_price};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportReport {
    pub gameweeks: usize,
    pub players: usize,
}

/// Writes a season report with a `Gameweeks` sheet and a `Squad` sheet.
pub fn export_season<P>(path: &Path, state: &SeasonState, provider: &P) -> Result<ExportReport>
where
    P: SeasonDataProvider + ?Sized,
{
    let mut gameweek_rows = vec![
        [
            "gameweek", "chip", "transfers", "hit", "points", "total", "bank", "subs",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>(),
    ];
    gameweek_rows.extend(state.history().iter().map(gameweek_row));

    let mut squad_rows = vec![
        [
            "id", "name", "position", "club", "price", "role", "season_points",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>(),
    ];
    let squad = state.squad();
    let price_gw = state.gameweek().min(state.rules().gameweeks);
    for pick in squad.picks() {
        let Some(player) = provider.player(pick.id) else {
            continue;
        };
        let club = provider
            .club_info(player.club)
            .map(|c| c.short_name.clone())
            .unwrap_or_else(|| player.club.to_string());
        let role = if pick.id == squad.captain() {
            "captain"
        } else if pick.id == squad.vice_captain() {
            "vice captain"
        } else if squad.is_benched(pick.id) {
            "bench"
        } else {
            "starter"
        };
        let season_points: i32 = (1..=state.rules().gameweeks)
            .map(|gw| provider.gameweek_points(pick.id, gw))
            .sum();
        squad_rows.push(vec![
            pick.id.to_string(),
            player.full_name(),
            pick.position.short_name().to_string(),
            club,
            provider
                .gameweek_price(pick.id, price_gw)
                .map(format_price)
                .unwrap_or_default(),
            role.to_string(),
            season_points.to_string(),
        ]);
    }

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Gameweeks")?;
        write_rows(sheet, &gameweek_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Squad")?;
        write_rows(sheet, &squad_rows)?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportReport {
        gameweeks: gameweek_rows.len().saturating_sub(1),
        players: squad_rows.len().saturating_sub(1),
    })
}

fn gameweek_row(record: &GameweekRecord) -> Vec<String> {
    let subs = record
        .substitutions
        .iter()
        .map(|s| format!("{}->{}", s.player_out, s.player_in))
        .collect::<Vec<_>>()
        .join(" ");
    vec![
        record.gameweek.to_string(),
        record.chip.map(|c| c.label().to_string()).unwrap_or_default(),
        record.transfers.to_string(),
        record.hit.to_string(),
        record.points.to_string(),
        record.total_points.to_string(),
        format_price(record.bank),
        subs,
    ]
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
