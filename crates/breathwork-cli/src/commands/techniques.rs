use breathwork_core::TechniqueCatalog;

pub fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = TechniqueCatalog::builtin()?;

    if json {
        let techniques: Vec<_> = catalog.iter().map(|t| t.as_ref()).collect();
        println!("{}", serde_json::to_string_pretty(&techniques)?);
        return Ok(());
    }

    for technique in catalog.iter() {
        let phases: Vec<&str> = technique.phases().iter().map(|p| p.name.as_str()).collect();
        println!(
            "{:<10} {:<20} {:<8} {:>3}s  {}",
            technique.id,
            technique.name,
            technique.pattern,
            technique.total_duration(),
            phases.join(" / ")
        );
    }
    Ok(())
}
