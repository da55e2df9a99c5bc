//! Streams subcommand - list the output files an entity produces

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use flatline_openalex::Entity;

use super::EntityArg;

#[derive(Args, Debug)]
pub struct StreamsArgs {
    /// Entity type
    #[arg(value_enum)]
    pub entity: EntityArg,
}

pub fn run(args: StreamsArgs) -> Result<()> {
    let entity: Entity = args.entity.into();
    println!("{}", streams_table(entity));
    Ok(())
}

fn streams_table(entity: Entity) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Stream").fg(Color::Cyan),
            Cell::new("File").fg(Color::Cyan),
            Cell::new("Columns").fg(Color::Cyan),
        ]);
    for stream in entity.streams() {
        table.add_row(vec![
            stream.name.to_string(),
            entity.file_name(stream.name),
            stream.columns.join(", "),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_row_per_stream() {
        for entity in Entity::all() {
            let table = streams_table(*entity);
            assert_eq!(table.row_iter().count(), entity.streams().len());
        }
    }

    #[test]
    fn table_lists_file_names() {
        let rendered = streams_table(Entity::Funders).to_string();
        assert!(rendered.contains("funders.csv.gz"));
        assert!(rendered.contains("funders_ids.csv.gz"));
        assert!(rendered.contains("crossref_id"));
    }
}
