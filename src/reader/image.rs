//! Raw view of a module image: the metadata root, its heaps and the rows of every table.
//!
//! [`CodeImage`] performs all structural checks that do not need the instructions: stream
//! layout, heap null entries, table schema and that every simple and coded index lands inside
//! its target table.

use std::ops::Range;

use log::trace;

use crate::{
    metadata::{
        pdb::CodeViewRecord,
        root::Root,
        streams::{Blob, Guid, Strings, TablesHeader, UserStrings},
        tables::{
            AssemblyRaw, AssemblyRefRaw, CodedIndex, FieldRaw, MemberRefRaw, MethodDefRaw,
            ModuleRaw, ParamRaw, StandAloneSigRaw, TableId, TableInfo, TypeDefRaw, TypeRefRaw,
        },
        token::Token,
    },
    Result,
};

/// Reserved bytes at the start of the `#IL` stream; no body can live there
pub const IL_RESERVED: usize = 4;

/// The heaps and tables of a module image, checked for internal consistency.
pub struct CodeImage<'a> {
    /// Parsed metadata root
    pub root: Root,
    /// `#Strings`
    pub strings: Strings<'a>,
    /// `#US`, absent in images without string literals
    pub user_strings: Option<UserStrings<'a>>,
    /// `#Blob`
    pub blobs: Blob<'a>,
    /// `#GUID`
    pub guids: Guid<'a>,
    /// `#IL`, absent in images without method bodies
    pub il: &'a [u8],
    /// The debug record of `#CV`
    pub codeview: Option<CodeViewRecord>,
    /// Index widths and row counts
    pub info: TableInfo,
    /// The single `Module` row
    pub module: ModuleRaw,
    /// `TypeRef` rows
    pub type_refs: Vec<TypeRefRaw>,
    /// `TypeDef` rows
    pub type_defs: Vec<TypeDefRaw>,
    /// `Field` rows
    pub fields: Vec<FieldRaw>,
    /// `MethodDef` rows
    pub methods: Vec<MethodDefRaw>,
    /// `Param` rows
    pub params: Vec<ParamRaw>,
    /// `MemberRef` rows
    pub member_refs: Vec<MemberRefRaw>,
    /// `StandAloneSig` rows
    pub signatures: Vec<StandAloneSigRaw>,
    /// The `Assembly` row, if any
    pub assembly: Option<AssemblyRaw>,
    /// `AssemblyRef` rows
    pub assembly_refs: Vec<AssemblyRefRaw>,
}

fn required<'a>(root: &Root, data: &'a [u8], name: &str) -> Result<&'a [u8]> {
    root.stream(data, name)
        .ok_or_else(|| malformed_error!("Module image has no {} stream", name))
}

impl<'a> CodeImage<'a> {
    /// Parse and check the module image `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for any structural inconsistency.
    pub fn parse(data: &'a [u8]) -> Result<CodeImage<'a>> {
        let root = Root::read(data)?;
        if root.stream(data, "#Pdb").is_some() {
            return Err(malformed_error!("Module image contains a #Pdb stream"));
        }

        let strings = Strings::from(required(&root, data, "#Strings")?)?;
        let blobs = Blob::from(required(&root, data, "#Blob")?)?;
        let guids = Guid::from(required(&root, data, "#GUID")?)?;
        let user_strings = root
            .stream(data, "#US")
            .map(UserStrings::from)
            .transpose()?;

        let il = root.stream(data, "#IL").unwrap_or_default();
        if !il.is_empty() && (il.len() < IL_RESERVED || il[..IL_RESERVED] != [0; IL_RESERVED]) {
            return Err(malformed_error!("#IL stream does not start with its reserved bytes"));
        }

        let codeview = root
            .stream(data, "#CV")
            .map(CodeViewRecord::read)
            .transpose()?;

        let tables = TablesHeader::from(required(&root, data, "#~")?, &TableId::MODULE_TABLES)?;
        let info = tables.info().clone();

        let mut modules = tables.table::<ModuleRaw>()?;
        if modules.len() != 1 {
            return Err(malformed_error!(
                "Module table has {} rows, expected exactly one",
                modules.len()
            ));
        }
        let module = modules.remove(0);

        let mut assemblies = tables.table::<AssemblyRaw>()?;
        if assemblies.len() > 1 {
            return Err(malformed_error!(
                "Assembly table has {} rows, expected at most one",
                assemblies.len()
            ));
        }

        let image = CodeImage {
            root,
            strings,
            user_strings,
            blobs,
            guids,
            il,
            codeview,
            module,
            type_refs: tables.table()?,
            type_defs: tables.table()?,
            fields: tables.table()?,
            methods: tables.table()?,
            params: tables.table()?,
            member_refs: tables.table()?,
            signatures: tables.table()?,
            assembly: assemblies.pop(),
            assembly_refs: tables.table()?,
            info,
        };

        image.check_indices()?;
        trace!(
            "module image: {} type(s), {} method(s), {} type ref(s), {} member ref(s)",
            image.type_defs.len(),
            image.methods.len(),
            image.type_refs.len(),
            image.member_refs.len()
        );

        Ok(image)
    }

    /// Returns true if `token` addresses an existing row
    #[must_use]
    pub fn contains(&self, token: Token) -> bool {
        TableId::from_repr(token.table())
            .is_some_and(|table| token.row() >= 1 && token.row() <= self.info.rows(table))
    }

    fn check_coded(&self, index: &CodedIndex, nullable: bool, what: &str) -> Result<()> {
        if index.is_null() {
            if nullable {
                return Ok(());
            }
            return Err(malformed_error!("{} is null", what));
        }
        if !self.contains(index.token()) {
            return Err(malformed_error!(
                "{} refers to missing row {}",
                what,
                index.token()
            ));
        }

        Ok(())
    }

    fn check_indices(&self) -> Result<()> {
        for (row, type_ref) in self.type_refs.iter().enumerate() {
            self.check_coded(
                &type_ref.resolution_scope,
                false,
                &format!("Resolution scope of TypeRef {}", row + 1),
            )?;
        }
        for (row, type_def) in self.type_defs.iter().enumerate() {
            self.check_coded(
                &type_def.extends,
                true,
                &format!("Base type of TypeDef {}", row + 1),
            )?;
        }
        for (row, member_ref) in self.member_refs.iter().enumerate() {
            self.check_coded(
                &member_ref.class,
                false,
                &format!("Parent of MemberRef {}", row + 1),
            )?;
        }

        // Validates monotonic, in range list columns
        self.field_runs()?;
        self.method_runs()?;
        self.param_runs()?;
        Ok(())
    }

    /// The `Field` rows owned by each `TypeDef`, as 0-based ranges
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the `FieldList` column is not monotonic.
    pub fn field_runs(&self) -> Result<Vec<Range<usize>>> {
        let starts: Vec<u32> = self.type_defs.iter().map(|t| t.field_list).collect();
        runs(&starts, self.fields.len(), "FieldList")
    }

    /// The `MethodDef` rows owned by each `TypeDef`, as 0-based ranges
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the `MethodList` column is not monotonic.
    pub fn method_runs(&self) -> Result<Vec<Range<usize>>> {
        let starts: Vec<u32> = self.type_defs.iter().map(|t| t.method_list).collect();
        runs(&starts, self.methods.len(), "MethodList")
    }

    /// The `Param` rows owned by each `MethodDef`, as 0-based ranges
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the `ParamList` column is not monotonic.
    pub fn param_runs(&self) -> Result<Vec<Range<usize>>> {
        let starts: Vec<u32> = self.methods.iter().map(|m| m.param_list).collect();
        runs(&starts, self.params.len(), "ParamList")
    }

    /// String at `index` of `#Strings`, owned
    ///
    /// # Errors
    /// Returns an error if the index is invalid.
    pub fn string(&self, index: u32) -> Result<String> {
        Ok(self.strings.get(index as usize)?.to_string())
    }

    /// Blob at `index` of `#Blob`, owned
    ///
    /// # Errors
    /// Returns an error if the index is invalid.
    pub fn blob(&self, index: u32) -> Result<Vec<u8>> {
        Ok(self.blobs.get(index as usize)?.to_vec())
    }

    /// Literal at `index` of `#US`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the image has no `#US` stream or the index is
    /// invalid.
    pub fn user_string(&self, index: u32) -> Result<String> {
        let heap = self
            .user_strings
            .as_ref()
            .ok_or_else(|| malformed_error!("ldstr without a #US stream"))?;
        heap.get(index as usize)
            .map_err(|_| malformed_error!("ldstr refers to invalid #US index {:#x}", index))
    }
}

/// Split `total` rows into the runs described by the 1-based `starts` of a list column.
///
/// Every start is in `1..=total + 1` and no start is smaller than the one before it; a run
/// extends to the next start or to the end of the table.
fn runs(starts: &[u32], total: usize, column: &str) -> Result<Vec<Range<usize>>> {
    let mut result = Vec::with_capacity(starts.len());
    for (position, start) in starts.iter().enumerate() {
        let start = *start as usize;
        if start == 0 || start > total + 1 {
            return Err(malformed_error!(
                "{} of row {} points to {} of {} rows",
                column,
                position + 1,
                start,
                total
            ));
        }

        let end = starts.get(position + 1).map_or(total + 1, |next| *next as usize);
        if end < start || end > total + 1 {
            return Err(malformed_error!(
                "{} is not monotonic at row {}",
                column,
                position + 1
            ));
        }

        result.push(start - 1..end - 1);
    }

    Ok(result)
}
