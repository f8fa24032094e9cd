//! Builds a miniature CIFAR-100 archive in the same pickle layout as the real one.

use std::{fs::File, path::Path};

use flate2::{write::GzEncoder, Compression};

pub const PIXELS: usize = 32 * 32 * 3;

/// Pixel value of channel `c` in image `i`.
pub fn pixel(i: usize, c: usize) -> u8 {
    (i * 3 + c) as u8
}

/// Labels cycle through the classes so every value stays below 100.
pub fn label(i: usize) -> u8 {
    (i % 100) as u8
}

/// Channel-first pixel buffer where every plane is a single colour.
fn pixels(n: usize) -> Vec<u8> {
    (0..n)
        .flat_map(|i| (0..3).flat_map(move |c| std::iter::repeat(pixel(i, c)).take(32 * 32)))
        .collect()
}

/// Minimal protocol 2 pickle writer, emitting the opcodes a Python 2 dump of
/// the dataset uses.
struct Pickler {
    out: Vec<u8>,
}

impl Pickler {
    fn new() -> Self {
        Self {
            out: vec![0x80, 0x02],
        }
    }

    fn op(&mut self, code: u8) -> &mut Self {
        self.out.push(code);
        self
    }

    fn short_str(&mut self, s: &[u8]) -> &mut Self {
        self.out.push(b'U');
        self.out.push(s.len() as u8);
        self.out.extend_from_slice(s);
        self
    }

    fn long_str(&mut self, s: &[u8]) -> &mut Self {
        self.out.push(b'T');
        self.out.extend((s.len() as u32).to_le_bytes());
        self.out.extend_from_slice(s);
        self
    }

    fn int(&mut self, v: i32) -> &mut Self {
        match v {
            0..=0xff => {
                self.out.extend([b'K', v as u8]);
            }
            _ => {
                self.out.push(b'J');
                self.out.extend(v.to_le_bytes());
            }
        }
        self
    }

    fn global(&mut self, module: &str, name: &str) -> &mut Self {
        self.out.push(b'c');
        self.out.extend(format!("{module}\n{name}\n").bytes());
        self
    }

    /// `numpy.ndarray` of `uint8` with the given shape and payload.
    fn u8_array(&mut self, shape: &[i32], payload: &[u8]) -> &mut Self {
        self.global("numpy.core.multiarray", "_reconstruct")
            .global("numpy", "ndarray")
            .int(0)
            .op(0x85)
            .short_str(b"b")
            .op(0x87)
            .op(b'R');

        self.op(b'(').int(1).op(b'(');
        for &d in shape {
            self.int(d);
        }
        self.op(b't');

        self.global("numpy", "dtype")
            .short_str(b"u1")
            .int(0)
            .int(1)
            .op(0x87)
            .op(b'R')
            .op(b'(')
            .int(3)
            .short_str(b"|")
            .op(b'N')
            .op(b'N')
            .op(b'N')
            .int(-1)
            .int(-1)
            .int(0)
            .op(b't')
            .op(b'b');

        self.op(0x89).long_str(payload).op(b't').op(b'b')
    }

    fn finish(&mut self) -> Vec<u8> {
        self.out.push(b'.');
        std::mem::take(&mut self.out)
    }
}

/// `{'data': uint8 (n, 3072), 'fine_labels': [...]}`.
pub fn split_pickle(n: usize) -> Vec<u8> {
    let mut p = Pickler::new();
    p.op(b'}').op(b'(');
    p.short_str(b"data").u8_array(&[n as i32, PIXELS as i32], &pixels(n));
    p.short_str(b"fine_labels").op(b']').op(b'(');
    for i in 0..n {
        p.int(i32::from(label(i)));
    }
    p.op(b'e').op(b'u');
    p.finish()
}

/// `{'fine_label_names': [...]}`, each name a Python 2 str.
pub fn meta_pickle(names: &[&[u8]]) -> Vec<u8> {
    let mut p = Pickler::new();
    p.op(b'}').short_str(b"fine_label_names").op(b']').op(b'(');
    for name in names {
        p.short_str(name);
    }
    p.op(b'e').op(b's');
    p.finish()
}

/// Writes `archive` as a gzipped tarball holding `cifar-100-python/{train,test,meta}`.
pub fn write_archive(archive: &Path, train: usize, test: usize, names: &[&[u8]]) {
    let file = File::create(archive).unwrap();
    let mut tar = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    let members = [
        ("cifar-100-python/train", split_pickle(train)),
        ("cifar-100-python/test", split_pickle(test)),
        ("cifar-100-python/meta", meta_pickle(names)),
    ];
    for (path, bytes) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append_data(&mut header, path, &bytes[..]).unwrap();
    }

    tar.into_inner().unwrap().finish().unwrap();
}
