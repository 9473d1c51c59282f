/// Generates the gRPC client and server bindings for `proto/pcfg.proto`.
///
/// The encoded file descriptor set is written next to the generated code as
/// `pcfg_descriptor.bin` so the coordinator can serve gRPC reflection.
///
/// Generated code is included with:
///
/// ```rust,ignore
/// pub mod proto {
///     tonic::include_proto!("pcfg");
/// }
/// ```
use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("pcfg_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    println!("cargo:rerun-if-changed=proto/pcfg.proto");
    tonic_prost_build::configure()
        .build_transport(false)
        .compile_with_config(config, &["proto/pcfg.proto"], &["proto"])
        .unwrap();
}
