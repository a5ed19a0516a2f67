use std::path::PathBuf;

use lyric_object::{LyricObject, dump};

use super::error::Result;

pub struct DumpArgs {
    pub object_path: PathBuf,
}

pub fn run(args: DumpArgs) {
    match render(&args) {
        Ok(text) => print!("{text}"),
        Err(err) => err.exit(),
    }
}

/// Load and validate the object, then render it.
pub fn render(args: &DumpArgs) -> Result<String> {
    let object = LyricObject::from_path(&args.object_path)?;
    Ok(dump(&object))
}
