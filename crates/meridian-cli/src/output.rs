use anyhow::Result;
use meridian_config::recognized_variables;
use meridian_entities::ConnectDetails;
use meridian_store::EnumeratedDocument;

/// One line per persisted entity, plus an indented SSH hint for clusters and
/// storage nodes that have already published connection details.
pub fn print_state_entry(doc: &EnumeratedDocument) {
    let status = doc.raw.get("status").and_then(|v| v.as_str()).unwrap_or("unknown");
    println!("{} - status: {}", doc.id, status);

    if matches!(doc.kind, "cluster" | "storage") {
        if let Some(connection) = doc.raw.get("connection") {
            if let Ok(details) = serde_yaml::from_value::<ConnectDetails>(connection.clone()) {
                if let Some(hint) = details.describe() {
                    println!("    {}", hint);
                }
            }
        }
    }
}

/// `print-vars <kind>`: the user variables that kind recognizes, in the
/// order entities check them.
pub fn print_vars(kind: &str) -> Result<()> {
    let vars = recognized_variables(kind)?;
    println!("{}:", kind);
    for name in vars {
        println!("\t{:<25}", name);
    }
    Ok(())
}
