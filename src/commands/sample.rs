use clap::{Args, Subcommand, ValueEnum};
use morel_core::{Manager, Model, Occurrence, Removal, Sample};
use serde_json::Value;
use std::io::{self, Write};

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args)]
pub struct SampleCommand {
    #[command(subcommand)]
    pub command: SampleSubcommand,
}

#[derive(Subcommand)]
pub enum SampleSubcommand {
    /// Record a new sample
    Create {
        /// Attribute as NAME=VALUE (can be repeated)
        #[arg(long = "attr", short, value_name = "NAME=VALUE", value_parser = parse_attribute)]
        attributes: Vec<(String, Value)>,

        /// Add an occurrence of this taxon (can be repeated)
        #[arg(long = "taxon", value_name = "TAXON")]
        taxa: Vec<String>,
    },

    /// List stored samples
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Only samples with unsynced changes
        #[arg(long)]
        pending: bool,
    },

    /// Show a sample's details
    Show {
        /// Sample cid or server id
        identifier: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Set attributes on an existing sample
    Set {
        /// Sample cid or server id
        identifier: String,

        /// Attribute as NAME=VALUE (can be repeated)
        #[arg(value_name = "NAME=VALUE", value_parser = parse_attribute, required = true)]
        attributes: Vec<(String, Value)>,
    },

    /// Delete a sample, on the server too if it was synced
    Delete {
        /// Sample cid or server id
        identifier: String,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

/// Parses `NAME=VALUE`; values that are valid JSON keep their type.
fn parse_attribute(s: &str) -> Result<(String, Value), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;

    let name = name.trim();
    if name.is_empty() {
        return Err("attribute name cannot be empty".to_string());
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

impl SampleCommand {
    pub async fn run(&self, manager: &Manager) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            SampleSubcommand::Create { attributes, taxa } => {
                let mut sample = Sample::new();
                for (name, value) in attributes {
                    sample.set(name.clone(), value.clone());
                }
                for taxon in taxa {
                    sample.add_occurrence(Occurrence::new().with_attribute("taxon", taxon.clone()));
                }

                let created = manager.set(&sample).await?;
                println!("Created sample:");
                println!("{}", created);
                Ok(())
            }

            SampleSubcommand::List { format, pending } => {
                let samples: Vec<Sample> = manager
                    .get_all::<Sample>()
                    .await?
                    .into_iter()
                    .filter(|s| !pending || s.is_pending())
                    .collect();

                if samples.is_empty() {
                    println!("No samples found");
                    return Ok(());
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&samples)?);
                    }
                    OutputFormat::Text => {
                        println!("{:<36}  {:<8}  {:<7}  ATTRIBUTES", "CID", "ID", "STATUS");
                        println!("{}", "-".repeat(80));
                        for sample in &samples {
                            let id = sample.id.map(|id| id.to_string()).unwrap_or_default();
                            let status = if sample.is_pending() {
                                "pending"
                            } else {
                                "synced"
                            };
                            let attributes: Vec<String> = sample
                                .attributes
                                .iter()
                                .map(|(name, value)| format!("{}={}", name, value))
                                .collect();
                            println!(
                                "{:<36}  {:<8}  {:<7}  {}",
                                sample.cid,
                                id,
                                status,
                                attributes.join(", ")
                            );
                        }
                        println!("\nTotal: {} sample(s)", samples.len());
                    }
                }
                Ok(())
            }

            SampleSubcommand::Show { identifier, format } => {
                let sample = manager
                    .find::<Sample>(identifier.as_str())
                    .await?
                    .ok_or_else(|| format!("Sample not found: {}", identifier))?;

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&sample)?);
                    }
                    OutputFormat::Text => {
                        println!("{}", sample);
                    }
                }
                Ok(())
            }

            SampleSubcommand::Set {
                identifier,
                attributes,
            } => {
                let mut sample = manager
                    .find::<Sample>(identifier.as_str())
                    .await?
                    .ok_or_else(|| format!("Sample not found: {}", identifier))?;

                for (name, value) in attributes {
                    sample.set(name.clone(), value.clone());
                }

                let updated = manager.set(&sample).await?;
                println!("Updated sample:");
                println!("{}", updated);
                Ok(())
            }

            SampleSubcommand::Delete { identifier, force } => {
                let sample = manager
                    .find::<Sample>(identifier.as_str())
                    .await?
                    .ok_or_else(|| format!("Sample not found: {}", identifier))?;

                if !force {
                    print!("Delete sample '{}'? [y/N] ", sample.cid);
                    io::stdout().flush()?;

                    let mut input = String::new();
                    io::stdin().read_line(&mut input)?;

                    if !input.trim().eq_ignore_ascii_case("y") {
                        println!("Deletion cancelled.");
                        return Ok(());
                    }
                }

                match manager.remove::<Sample>(&sample).await? {
                    Removal::Removed => println!("Deleted sample: {}", sample.cid),
                    Removal::Pending => println!(
                        "Deleted sample locally: {} (server deletion pending, run `morel sync`)",
                        sample.cid
                    ),
                }
                Ok(())
            }
        }
    }
}
