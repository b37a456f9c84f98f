use prost::Message;
use std::env::var;
use std::error::Error;
use std::fs;

fn main() -> Result<(), Box<dyn Error>> {
    let proto_files = &["proto/echo.proto"];
    let proto_folder = "proto";
    let out_dir = var("OUT_DIR")?;
    let descriptors_path = format!("{}/descriptors.bin", out_dir);

    println!("cargo:rerun-if-changed={proto_folder}");

    // Parsed in-process by protox; no protoc binary is involved.
    let file_descriptors = protox::compile(proto_files, [proto_folder])?;
    fs::write(&descriptors_path, file_descriptors.encode_to_vec())?;

    tonic_prost_build::configure()
        .build_client(false)
        .compile_fds(file_descriptors)?;

    Ok(())
}
