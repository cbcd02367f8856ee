#![allow(dead_code)]

use std::cell::Cell;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use chamberlab::retrieval::{ArchiveSource, RemoteBody};
use chamberlab::LabError;
use zip::write::SimpleFileOptions;

pub const OBSERVATIONS_CSV: &str = "\
timestamp,red,green,blue,current,image_file
0,10,20,30,0.51,img_0.bmp
1,11,21,31,0.52,img_1.bmp
2,12,22,32,0.53,img_2.bmp
";

pub const MANIFEST_NO_IMAGES: &str = "observations_file: data.csv\nimage_directory: null\n";

pub const MANIFEST_WITH_IMAGES: &str =
    "observations_file: observations.csv\nimage_directory: images\n";

pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixel_array_size = row_stride * height;
    let file_size = 54 + pixel_array_size;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&54u32.to_le_bytes());

    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&pixel_array_size.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    bytes.resize(file_size as usize, 0);
    bytes
}

pub fn write_bmp(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, bmp_bytes(width, height)).expect("write bmp file");
}

/// Zip `entries` (name, contents) in memory. Names ending in '/' become
/// directories.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, contents) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).expect("add directory");
        } else {
            writer.start_file(*name, options).expect("start file");
            writer.write_all(contents).expect("write entry");
        }
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Archive of a tabular-only dataset with three observations.
pub fn tabular_archive() -> Vec<u8> {
    zip_bytes(&[
        ("manifest.yaml", MANIFEST_NO_IMAGES.as_bytes()),
        ("data.csv", OBSERVATIONS_CSV.as_bytes()),
    ])
}

/// Archive of a dataset with three 4x2 images, wrapped in `folder/`.
pub fn image_archive(folder: &str) -> Vec<u8> {
    let image = bmp_bytes(4, 2);
    let manifest = format!("{folder}/manifest.yaml");
    let observations = format!("{folder}/observations.csv");
    let images_dir = format!("{folder}/images/");
    let names: Vec<String> = (0..3)
        .map(|i| format!("{folder}/images/img_{i}.bmp"))
        .collect();

    let mut entries: Vec<(&str, &[u8])> = vec![
        (manifest.as_str(), MANIFEST_WITH_IMAGES.as_bytes()),
        (observations.as_str(), OBSERVATIONS_CSV.as_bytes()),
        (images_dir.as_str(), b""),
    ];
    for name in &names {
        entries.push((name.as_str(), image.as_slice()));
    }
    zip_bytes(&entries)
}

/// Write an extracted tabular dataset into `dir`.
pub fn write_tabular_dataset(dir: &Path) {
    fs::create_dir_all(dir).expect("create dataset dir");
    fs::write(dir.join("manifest.yaml"), MANIFEST_NO_IMAGES).expect("write manifest");
    fs::write(dir.join("data.csv"), OBSERVATIONS_CSV).expect("write observations");
}

/// Write an extracted image dataset into `dir`.
pub fn write_image_dataset(dir: &Path) {
    fs::create_dir_all(dir).expect("create dataset dir");
    fs::write(dir.join("manifest.yaml"), MANIFEST_WITH_IMAGES).expect("write manifest");
    fs::write(dir.join("observations.csv"), OBSERVATIONS_CSV).expect("write observations");
    for i in 0..3 {
        write_bmp(&dir.join("images").join(format!("img_{i}.bmp")), 4, 2);
    }
}

/// In-memory archive source that counts how often it was opened.
pub struct MemorySource {
    payload: Vec<u8>,
    opens: Cell<usize>,
}

impl MemorySource {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            opens: Cell::new(0),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.get()
    }
}

impl ArchiveSource for MemorySource {
    fn open(&self, _url: &str) -> Result<RemoteBody, LabError> {
        self.opens.set(self.opens.get() + 1);
        Ok(RemoteBody {
            content_length: Some(self.payload.len() as u64),
            reader: Box::new(Cursor::new(self.payload.clone())),
        })
    }
}
