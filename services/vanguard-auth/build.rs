fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Server side only; the VCS host owns the client.
    tonic_build::configure()
        .build_server(true)
        .build_client(false)
        .compile_protos(&["proto/vcs_auth.proto"], &["proto"])?;

    Ok(())
}
