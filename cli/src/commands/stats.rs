use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use psyjournal_core::service::JournalService;

use super::helpers::{format_dose, format_local, print_json, since_days};

pub(crate) fn cmd_stats(svc: &JournalService, days: Option<u32>, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct StatRow {
        #[tabled(rename = "Substance")]
        substance: String,
        #[tabled(rename = "Ingestions")]
        ingestions: i64,
        #[tabled(rename = "Experiences")]
        experiences: i64,
        #[tabled(rename = "Total dose")]
        total: String,
        #[tabled(rename = "Last used")]
        last_used: String,
    }

    let stats = svc.db().substance_stats(since_days(days))?;

    if json {
        print_json(&stats)?;
        return Ok(());
    }
    if stats.is_empty() {
        match days {
            Some(d) => eprintln!("No ingestions in the last {d} days"),
            None => eprintln!("No ingestions logged yet"),
        }
        return Ok(());
    }

    let rows: Vec<StatRow> = stats
        .iter()
        .map(|s| {
            let mut total = format_dose(Some(s.total_known_dose), &s.units, false);
            if s.has_unknown_dose {
                total.push_str(" + unknown");
            }
            StatRow {
                substance: s.substance_name.clone(),
                ingestions: s.ingestion_count,
                experiences: s.experience_count,
                total,
                last_used: format_local(&s.last_used),
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..4)).with(Alignment::right()))
        .to_string();
    match days {
        Some(d) => println!("Last {d} days:"),
        None => println!("All time:"),
    }
    println!("{table}");
    Ok(())
}
