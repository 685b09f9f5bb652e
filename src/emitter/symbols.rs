//! Serialization of the symbol image.

use crate::{
    metadata::{
        pdb::{encode_document_name, PdbStream, PDB_ID_SIZE},
        root::{RootBuilder, PDB_VERSION},
        sequencepoints::{encode_sequence_points, SequencePoint, SequencePoints},
        streams::{BlobHeapBuilder, GuidHeapBuilder, HeapBuilder, TablesBuilder},
        tables::{
            DocumentRaw, MethodDebugInformationRaw, TableId, TableInfo, HEAP_LARGE_BLOB,
            HEAP_LARGE_GUID,
        },
    },
    model::{DebugSymbolMap, Module},
    Error, Result,
};

/// The streams of a symbol image; only `#Pdb` changes once the id is known.
pub(crate) struct SymbolStreams {
    pdb: PdbStream,
    tables: Vec<u8>,
    guids: Vec<u8>,
    blobs: Vec<u8>,
}

impl SymbolStreams {
    /// Lay out the image carrying `id`
    pub(crate) fn image(&self, id: [u8; PDB_ID_SIZE]) -> Result<Vec<u8>> {
        let pdb = PdbStream {
            id,
            ..self.pdb.clone()
        };

        RootBuilder::new(PDB_VERSION)
            .stream("#Pdb", pdb.build())
            .stream("#~", self.tables.clone())
            .stream("#GUID", self.guids.clone())
            .stream("#Blob", self.blobs.clone())
            .build()
    }
}

fn sequence_points(
    symbols: &DebugSymbolMap,
    offsets: &[u32],
    context: &str,
) -> Result<(u32, Vec<u8>)> {
    let points = SequencePoints {
        local_signature: symbols.local_signature,
        points: symbols
            .points
            .iter()
            .map(|point| SequencePoint {
                il_offset: offsets[point.instruction],
                document: point.document,
                start_line: point.start_line,
                start_col: point.start_col,
                end_line: point.end_line,
                end_col: point.end_col,
            })
            .collect(),
    };

    let document = points.single_document().unwrap_or(0);
    let blob = encode_sequence_points(&points, document).map_err(|e| match e {
        Error::EmissionFailure { message, .. } => Error::EmissionFailure {
            context: context.to_string(),
            message,
        },
        other => other,
    })?;

    Ok((document, blob))
}

/// Build the symbol streams of `module`.
///
/// `offsets` holds the instruction offsets of each method body as laid out in the module
/// image, by `MethodDef` row.
pub(crate) fn build(module: &Module, offsets: &[Option<Vec<u32>>]) -> Result<SymbolStreams> {
    let mut guids = GuidHeapBuilder::new();
    let mut blobs = BlobHeapBuilder::new();

    let mut documents = Vec::with_capacity(module.documents.len());
    for document in &module.documents {
        documents.push(DocumentRaw {
            name: encode_document_name(&document.name, &mut blobs)?,
            hash_algorithm: guids.add(document.hash_algorithm)?,
            hash: blobs.add(&document.hash)?,
            language: guids.add(document.language)?,
        });
    }

    let mut debug_information = Vec::with_capacity(offsets.len());
    for ((_, ty, method), method_offsets) in module.methods().zip(offsets) {
        let symbols = method
            .body
            .as_ref()
            .and_then(|body| body.symbols.as_ref())
            .filter(|symbols| !symbols.points.is_empty());

        let row = match (symbols, method_offsets) {
            (Some(symbols), Some(method_offsets)) => {
                let context = format!("{}::{}", ty.full_name(), method.name);
                let (document, blob) = sequence_points(symbols, method_offsets, &context)?;
                MethodDebugInformationRaw {
                    document,
                    sequence_points: blobs.add(&blob)?,
                }
            }
            _ => MethodDebugInformationRaw {
                document: 0,
                sequence_points: 0,
            },
        };
        debug_information.push(row);
    }

    let mut heap_sizes = 0;
    if guids.is_large() {
        heap_sizes |= HEAP_LARGE_GUID;
    }
    if blobs.is_large() {
        heap_sizes |= HEAP_LARGE_BLOB;
    }

    #[allow(clippy::cast_possible_truncation)]
    let info = TableInfo::new(
        &[
            (TableId::Document, documents.len() as u32),
            (TableId::MethodDebugInformation, debug_information.len() as u32),
        ],
        heap_sizes,
    );
    let mut tables = TablesBuilder::new(info);
    tables.add_table(&documents)?;
    tables.add_table(&debug_information)?;

    #[allow(clippy::cast_possible_truncation)]
    let type_system_rows = TableId::MODULE_TABLES
        .iter()
        .map(|table| (*table, module.rows(*table) as u32))
        .filter(|(_, rows)| *rows > 0)
        .collect();

    Ok(SymbolStreams {
        pdb: PdbStream {
            id: [0; PDB_ID_SIZE],
            entry_point: module.entry_point,
            type_system_rows,
        },
        tables: tables.build(),
        guids: guids.build(),
        blobs: blobs.build(),
    })
}
