//! `appforge predict` — Show what a request maps to.

use appforge_context::{AppType, Predictor, TemplateLibrary};

pub fn run(request: &str, app_type: Option<AppType>) -> Result<(), Box<dyn std::error::Error>> {
    let prediction = Predictor::new().predict(request, app_type);
    let library = TemplateLibrary::react_starter();

    println!("  App type:    {}", prediction.app_type);
    println!("  Components:  {}", prediction.components.join(", "));
    let unknown: Vec<&str> = prediction
        .components
        .iter()
        .map(String::as_str)
        .filter(|name| library.component(name).is_none())
        .collect();
    if !unknown.is_empty() {
        println!("  Missing:     {}", unknown.join(", "));
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}
