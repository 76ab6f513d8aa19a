use clap::Parser;

#[derive(Parser)]
#[command(author, version, about = "Targeted Dalvik emulation for string de-obfuscation", long_about = None)]
pub struct Cli {
    /// The .dex files to index (classes.dex, classes2.dex, ... for multi-dex)
    #[arg(required = true)]
    pub dex: Vec<String>,

    /// Target method, `Lpkg/Cls;->name` or the full
    /// `Lpkg/Cls;->name(params)ret` form
    #[arg(long, short)]
    pub target: String,

    /// Only enumerate call sites, skip emulation
    #[arg(long)]
    pub list_sites: bool,

    /// Value returned by Context.getPackageName
    #[arg(long)]
    pub package_name: Option<String>,

    /// Hex-encoded signing certificate, surfaced via Signature.toByteArray
    #[arg(long)]
    pub signature_hex: Option<String>,

    /// Value of Build.VERSION.SDK_INT
    #[arg(long)]
    pub sdk_int: Option<i32>,

    /// Abort an emulation after this many instructions
    #[arg(long)]
    pub max_instructions: Option<u64>,

    /// Emit per-instruction tracing; honours RUST_LOG-style directives
    #[arg(long)]
    pub trace: bool,
}
