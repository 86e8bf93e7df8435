fn main() {
    println!("minvar-rs - Minority Variant Co-infection Analysis Tool");
    println!();
    println!("RECOMMENDED: Use the combined tool for most workflows:");
    println!("  minvar             - Complete analysis: VCF -> candidate tables (one step)");
    println!();
    println!("Tools for two-stage workflows:");
    println!("  minor_vars         - Minority-variant filtering (VCF -> JSON)");
    println!("  coinfection_report - Outlier classification (JSON -> CSV tables)");
    println!();
    println!("For help with each tool:");
    println!("  cargo run --bin minvar -- --help");
    println!("  cargo run --bin minor_vars -- --help");
    println!("  cargo run --bin coinfection_report -- --help");
    println!();
    println!("Quick start example:");
    println!("  cargo run -- --vcf variants.vcf.gz --out-dir results/");
}
