use std::io::Result;

fn main() -> Result<()> {
    // Compile the protobuf definitions
    prost_build::compile_protos(&["proto/idiom_vectors.proto"], &["proto/"])?;
    Ok(())
}
