use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::PathBuf;
use yaffs_unpack::{looks_like_yaffs, Geometry, Unpacker};

#[derive(Parser)]
#[command(name = "yaffs-unpack", about = "Extract raw YAFFS1/YAFFS2 flash images")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the image's directory tree under an output directory
    Unpack {
        image: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        /// Remove the output directory first if it already exists
        #[arg(short, long)]
        force: bool,
    },
    /// List the image's objects without writing anything
    List {
        image: PathBuf,
    },
    /// Show the detected image geometry
    Info {
        image: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    match Cli::parse().command {

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { image, output_dir, force } => {
            let mut file = File::open(&image)?;
            if !looks_like_yaffs(&mut file)? {
                return Err(format!("{} is not a valid YAFFS image", image.display()).into());
            }
            if output_dir.exists() {
                if force {
                    std::fs::remove_dir_all(&output_dir)?;
                } else {
                    return Err(format!(
                        "{} already exists (pass --force to replace it)",
                        output_dir.display()
                    ).into());
                }
            }
            std::fs::create_dir_all(&output_dir)?;

            let summary = Unpacker::new(file)?.unpack(&output_dir)?;
            println!("{}", summary.report());
            println!("Unpacked to: {}", output_dir.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { image } => {
            let mut unpacker = Unpacker::new(File::open(&image)?)?;
            println!("Image: {}", image.display());
            println!("{:<6} {:>12} {:<10} Path", "Id", "Size", "Type");
            for obj in unpacker.scan()? {
                let size = if obj.header.file_size >= 0 {
                    obj.header.file_size.to_string()
                } else {
                    "—".into()
                };
                println!(
                    "{:<6} {:>12} {:<10} {}",
                    obj.id, size, obj.header.object_type.name(), obj.path.display(),
                );
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { image } => {
            let mut file = File::open(&image)?;
            let geometry = Geometry::detect(&mut file)?;
            println!("── YAFFS image ──────────────────────────────────────────");
            println!("  Path        {}", image.display());
            println!("  Version     yaffs{}", geometry.version);
            println!("  Byte order  {}-endian", geometry.endianness.name());
            println!("  Page size   {} B", geometry.page_size);
            println!("  Spare size  {} B", geometry.spare_size);
        }
    }

    Ok(())
}
