fn main() {
    if let Err(err) = mcp_chat_relay::cli::main() {
        eprintln!("❌ Error: {err}");
        std::process::exit(1);
    }
}
