pub fn handle() {
    println!("skyforge {}", env!("CARGO_PKG_VERSION"));
}
