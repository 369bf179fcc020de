//! `steward inventory` - query the records a recipe can search

use anyhow::Result;
use declarative::Filter;

use crate::Context;
use crate::cli::InventoryArgs;
use crate::recipe;
use crate::ui;

/// Print matching records as a JSON array
pub fn run(ctx: &Context, args: &InventoryArgs) -> Result<u8> {
    let inventory = recipe::load_inventory(Some(&args.inventory))?;
    let filter = match &args.filter {
        Some(query) => Filter::parse(query)?,
        None => Filter::all(),
    };

    let records = inventory.query(&args.kind, &filter);
    if records.is_empty() && !ctx.quiet {
        ui::warn(&format!("No '{}' records match", args.kind));
    }
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(0)
}
