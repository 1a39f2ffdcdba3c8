use colored::Colorize;
use octofhir_export::AttributeMapping;
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_attributes(mapping: &AttributeMapping) {
    if mapping.is_empty() {
        println!("No attributes defined.");
        return;
    }

    let mut builder = Builder::default();
    builder.push_record(["Attribute", "Resource", "Cardinality", "Shape", "Columns"]);
    for definition in mapping.definitions() {
        let cardinality = definition.cardinality.to_string();
        let columns = if definition.select.is_empty() {
            "-".to_string()
        } else {
            definition.select.join(", ")
        };
        builder.push_record([
            definition.name.as_str(),
            definition.resource.as_str(),
            cardinality.as_str(),
            definition.shape_label(),
            columns.as_str(),
        ]);
    }
    let table = builder.build().with(Style::rounded()).to_string();
    println!("{table}");
    println!(
        "{} {} (root: {})",
        "Total:".cyan(),
        mapping.len(),
        mapping.patient_resource()
    );
}
