use anyhow::{Context, Result};
use clap::Parser;
use memmap2::Mmap;
use pecoff_dumper::{directory, fat, zero, ByteSource, ImageKind, PeTeImage};
use std::fs::{File, OpenOptions};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// PE/TE image or fat multi-architecture container.
    input: String,

    /// Decode and print base-relocation blocks.
    #[arg(short, long)]
    relocs: bool,

    /// Dump the security directory's certificate bytes.
    #[arg(short, long)]
    cert: bool,

    /// Hex-dump the raw bytes of the named section.
    #[arg(short, long)]
    section: Option<String>,

    /// Blank reproducibility-sensitive byte ranges in place.
    #[arg(short, long)]
    zero: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.zero {
        return zero_rewrite(&args.input);
    }

    let file = File::open(&args.input).with_context(|| format!("open {}", args.input))?;
    let mmap = unsafe { Mmap::map(&file)? };
    let mut source = ByteSource::from(&mmap[..]);

    match fat::arch_entries(&mut source)? {
        Some(entries) => {
            println!("Fat container: {} architectures", entries.len());
            for entry in &entries {
                println!(
                    "\n== {} (cpu type {:#x}, subtype {:#x}, {:#x} bytes at {:#x})",
                    entry.label(),
                    entry.cpu_type,
                    entry.cpu_subtype,
                    entry.size,
                    entry.offset
                );
                match fat::slice_image(&mut source, entry) {
                    Ok(mut image) => dump_image(&mut image, &args)?,
                    Err(err) => eprintln!("skipping {}: {err}", entry.label()),
                }
            }
        }
        None => {
            let mut image = PeTeImage::parse(ByteSource::from(&mmap[..]))?;
            dump_image(&mut image, &args)?;
        }
    }

    Ok(())
}

/// Parses the file read-write, computes the zero list and applies it.
fn zero_rewrite(path: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("open {path} read-write"))?;

    let mut image = PeTeImage::parse(ByteSource::from_file(file.try_clone()?))?;
    let ranges = zero::zero_ranges(&mut image)?;
    zero::apply_zero_ranges(&mut file, &ranges)?;

    println!("Zeroed {} ranges in {path}", ranges.len());
    Ok(())
}

fn dump_image(image: &mut PeTeImage, args: &Args) -> Result<()> {
    dump_header(image);
    dump_sections(image)?;

    let info = directory::codeview_info(image)?;
    if !info.path.is_empty() {
        println!("\nSymbol file: {}", info.path);
        if !info.guid.is_empty() {
            println!("GUID:        {}", info.guid);
        }
    }

    if args.relocs {
        dump_relocations(image)?;
    }
    if args.cert {
        dump_certificates(image)?;
    }
    if let Some(name) = &args.section {
        dump_raw_section(image, name)?;
    }
    Ok(())
}

fn dump_header(image: &PeTeImage) {
    let header = &image.header;
    println!("Image type:    {}", image.kind());
    println!(
        "Machine:       {} ({:#06x})",
        header.machine_name(),
        header.machine()
    );
    println!("Sections:      {}", header.number_of_sections());
    println!("Entry point:   {:#x}", header.address_of_entry_point());
    println!("Image base:    {:#x}", header.image_base());
    println!("Subsystem:     {:#x}", header.subsystem());
    if image.kind() == ImageKind::Te {
        println!("TE adjust:     {}", header.te_adjust());
    }
    if image.wrapped_in_fv_section {
        println!("Wrapped in a firmware-volume section");
    }
}

fn dump_sections(image: &mut PeTeImage) -> Result<()> {
    println!("\n{:<10} {:>10} {:>10} {:>10} {:>10} {:>10}", "Name", "VirtAddr", "VirtSize", "RawPtr", "RawSize", "Flags");
    for (name, section) in image.sections()? {
        println!(
            "{:<10} {:>10x} {:>10x} {:>10x} {:>10x} {:>10x}",
            name,
            section.virtual_address,
            section.virtual_size,
            section.pointer_to_raw_data,
            section.size_of_raw_data,
            section.characteristics
        );
    }
    Ok(())
}

fn dump_relocations(image: &mut PeTeImage) -> Result<()> {
    let blocks = directory::relocations(image)?;
    println!("\nRelocations: {} blocks", blocks.len());
    for block in blocks {
        println!(
            "  page {:#010x} ({} entries)",
            block.virtual_address,
            block.entries.len()
        );
        for entry in block.entries {
            println!("    type {:>2} offset {:#05x}", entry.kind, entry.page_offset);
        }
    }
    Ok(())
}

fn dump_certificates(image: &mut PeTeImage) -> Result<()> {
    match directory::certificates(image)? {
        None => println!("\nNo security directory"),
        Some(directory::CertificateDump::Uefi {
            length,
            revision,
            cert_type,
            data,
        }) => {
            println!(
                "\nCertificate: length {length:#x}, revision {revision:#x}, type {cert_type:#x}"
            );
            hexdump(&data);
        }
        Some(directory::CertificateDump::Legacy(blobs)) => {
            for (address, blob) in blobs {
                println!("\nCertificate blob at {address:#x} ({} bytes)", blob.len());
                hexdump(&blob);
            }
        }
    }
    Ok(())
}

fn dump_raw_section(image: &mut PeTeImage, name: &str) -> Result<()> {
    let Some((_, section)) = image.find_section(name)? else {
        anyhow::bail!("no section named {name:?}");
    };
    let offset = image.resolve_address(section.pointer_to_raw_data);
    let data = image.read_at(offset, section.size_of_raw_data as usize)?;
    println!("\n{name} raw data ({} bytes):", data.len());
    hexdump(&data);
    Ok(())
}

fn hexdump(data: &[u8]) {
    for (row, chunk) in data.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        let text: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
            .collect();
        println!("  {:08x}  {:<47}  {text}", row * 16, hex.join(" "));
    }
}
