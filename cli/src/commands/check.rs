use anyhow::Result;

use super::run::load_config;

/// Validate every buffer entry and print what would be built.
pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::CheckArgs) -> Result<()> {
    let config = load_config(&args.config)?;

    for (name, params) in &config.buffer_layer {
        match params.validate(name) {
            Ok(validated) => {
                let columns = validated.columns().into_iter()
                    .map(|(column, value)| format!("{column}={value}"))
                    .collect::<Vec<_>>();
                println!("{name} ({}): {}", params.kind(), columns.join(" "));
            }
            Err(e) => println!("{name}: {e}"),
        }
    }
    for (kind, predicate) in config.predicates() {
        println!("join {kind} layers with {predicate}");
    }
    if !config.groupby_columns.is_empty() {
        println!("group by {}", config.groupby_columns.join(", "));
    }
    Ok(())
}
