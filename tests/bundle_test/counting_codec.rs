use std::{
    io::{self, Write},
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use libbundlemaster::bundle_codec::{
    AssetsFile, BundleCodec, CodecError, Compression, DocumentBundle, DocumentCodec, FieldNode,
    ObjectInfo,
};

/// Counts how many bundles were opened and unloaded.
#[derive(Debug, Default)]
pub struct Counters {
    pub opened: AtomicUsize,
    pub unloaded: AtomicUsize,
}

impl Counters {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn unloaded(&self) -> usize {
        self.unloaded.load(Ordering::SeqCst)
    }
}

/// A codec call that [`CountingCodec`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    LoadAssetsFile,
    ReadTree,
    ReplaceAssetsFile,
    Write,
    Pack,
}

/// A [`DocumentCodec`] that reports to shared [`Counters`], optionally
/// failing one kind of call after the bundle has been opened.
pub struct CountingCodec {
    inner: DocumentCodec,
    counters: Arc<Counters>,
    fail_at: Option<FailAt>,
}

impl CountingCodec {
    pub fn new(counters: Arc<Counters>) -> Self {
        Self {
            inner: DocumentCodec::new(),
            counters,
            fail_at: None,
        }
    }

    pub fn failing(counters: Arc<Counters>, fail_at: FailAt) -> Self {
        Self {
            fail_at: Some(fail_at),
            ..Self::new(counters)
        }
    }

    fn check(&self, call: FailAt) -> Result<(), CodecError> {
        if self.fail_at == Some(call) {
            return Err(io::Error::new(io::ErrorKind::Other, format!("{:?} failed", call)).into());
        }

        Ok(())
    }
}

impl BundleCodec for CountingCodec {
    type Bundle = DocumentBundle;

    fn open(&mut self, path: &Path) -> Result<DocumentBundle, CodecError> {
        let bundle = self.inner.open(path)?;
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(bundle)
    }

    fn entry_names(&self, bundle: &DocumentBundle) -> Vec<String> {
        self.inner.entry_names(bundle)
    }

    fn load_assets_file(
        &mut self,
        bundle: &DocumentBundle,
        index: usize,
    ) -> Result<Option<AssetsFile>, CodecError> {
        self.check(FailAt::LoadAssetsFile)?;
        self.inner.load_assets_file(bundle, index)
    }

    fn read_tree(
        &mut self,
        bundle: &DocumentBundle,
        object: &ObjectInfo,
    ) -> Result<FieldNode, CodecError> {
        self.check(FailAt::ReadTree)?;
        self.inner.read_tree(bundle, object)
    }

    fn write_tree(
        &mut self,
        bundle: &DocumentBundle,
        tree: &FieldNode,
    ) -> Result<Vec<u8>, CodecError> {
        self.inner.write_tree(bundle, tree)
    }

    fn replace_assets_file(
        &mut self,
        bundle: &mut DocumentBundle,
        index: usize,
        file: AssetsFile,
    ) -> Result<(), CodecError> {
        self.check(FailAt::ReplaceAssetsFile)?;
        self.inner.replace_assets_file(bundle, index, file)
    }

    fn write(&mut self, bundle: &DocumentBundle, writer: &mut dyn Write) -> Result<(), CodecError> {
        self.check(FailAt::Write)?;
        self.inner.write(bundle, writer)
    }

    fn pack(
        &mut self,
        source: &Path,
        writer: &mut dyn Write,
        compression: Compression,
    ) -> Result<(), CodecError> {
        self.check(FailAt::Pack)?;
        self.inner.pack(source, writer, compression)
    }

    fn unload(&mut self, bundle: &mut DocumentBundle) {
        self.counters.unloaded.fetch_add(1, Ordering::SeqCst);
        self.inner.unload(bundle)
    }
}
