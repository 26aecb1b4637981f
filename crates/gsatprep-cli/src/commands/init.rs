//! The `gsat init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    // Create gsat.toml
    if std::path::Path::new("gsat.toml").exists() {
        println!("gsat.toml already exists, skipping.");
    } else {
        std::fs::write("gsat.toml", SAMPLE_CONFIG)?;
        println!("Created gsat.toml");
    }

    // Create example answer key
    std::fs::create_dir_all("keys")?;
    let example_path = std::path::Path::new("keys/example.toml");
    if example_path.exists() {
        println!("keys/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_KEY)?;
        println!("Created keys/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Add answer keys for the years you want to practise under keys/");
    println!("  2. Run: gsat validate");
    println!("  3. Run: gsat session answer --year example 1 B");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# gsatprep configuration

store_dir = "./.gsat-store"
keys_dir = "./keys"

[telemetry]
enabled = false
endpoint = "https://analytics.example.com"
api_key = "${GSAT_TELEMETRY_KEY}"
"#;

const EXAMPLE_KEY: &str = r#"# A five-question sample key.

[exam]
year = "example"
max_score = 8
time_limit_mins = 15

[[sections]]
section = "vocabulary"
range = [1, 2]
points = 1

[[sections]]
section = "mixed"
range = [3, 5]
points = 2

[answers]
1 = "B"
2 = "D"
3 = { fill = "participating" }
4 = { fill = "asylum", synonyms = ["refuge"] }
5 = ["C", "D"]
"#;
