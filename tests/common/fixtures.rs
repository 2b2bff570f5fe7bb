//! Fixture code and metadata.
//!
//! The blob mimics what IL2CPP emits for one generated table type under the System V convention
//! (`rdi` = builder, `rsi` = first payload argument). Offsets double as RVAs.
//!
//! | Offset | Method |
//! |--------|--------|
//! | 0x00 | `FlatBufferBuilder.StartTable` |
//! | 0x01 | `FlatBufferBuilder.EndTable` |
//! | 0x02 | `FlatBufferBuilder.AddLong` |
//! | 0x03 | `FlatBufferBuilder.AddInt` |
//! | 0x10 | `Item.AddId` (slot 0) |
//! | 0x20 | `Item.AddCount` (slot 1) |
//! | 0x30 | `Item.AddName` (slot register copied from a parameter) |
//! | 0x40 | `Item.EndItem` |
//! | 0x50 | `Item.CreateItem` |
//! | 0x80 | `Item.AddKind` (slot 2) |

/// Load address used when the blob is mapped raw.
pub const RAW_BASE: u64 = 0x1000;

/// Minimal x86-64 assembler for the handful of encodings the fixtures need.
#[derive(Default)]
pub struct Asm {
    code: Vec<u8>,
}

impl Asm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pad with `int3` up to `offset`.
    pub fn at(&mut self, offset: usize) -> &mut Self {
        assert!(self.code.len() <= offset, "fixture overlap at {:#x}", offset);
        self.code.resize(offset, 0xCC);
        self
    }

    /// `mov esi, imm32`
    pub fn mov_esi(&mut self, imm: u32) -> &mut Self {
        self.code.push(0xBE);
        self.code.extend_from_slice(&imm.to_le_bytes());
        self
    }

    /// `mov rsi, rdx`
    pub fn mov_rsi_rdx(&mut self) -> &mut Self {
        self.code.extend_from_slice(&[0x48, 0x89, 0xD6]);
        self
    }

    /// `call rel32` to a blob offset.
    pub fn call(&mut self, target: usize) -> &mut Self {
        let next = self.code.len() as i64 + 5;
        let rel = (target as i64 - next) as i32;
        self.code.push(0xE8);
        self.code.extend_from_slice(&rel.to_le_bytes());
        self
    }

    pub fn ret(&mut self) -> &mut Self {
        self.code.push(0xC3);
        self
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.code)
    }
}

pub fn item_blob() -> Vec<u8> {
    let mut asm = Asm::new();
    // Builder stubs
    asm.at(0x00).ret();
    asm.at(0x01).ret();
    asm.at(0x02).ret();
    asm.at(0x03).ret();
    // Helpers
    asm.at(0x10).mov_esi(0).call(0x02).ret();
    asm.at(0x20).mov_esi(1).call(0x03).ret();
    asm.at(0x30).mov_rsi_rdx().call(0x03).ret();
    asm.at(0x40).call(0x01).ret();
    // CreateItem: StartTable(4), helpers out of slot order, EndItem
    asm.at(0x50)
        .mov_esi(4)
        .call(0x00)
        .call(0x20)
        .call(0x30)
        .call(0x80)
        .call(0x10)
        .call(0x40)
        .ret();
    asm.at(0x80).mov_esi(2).call(0x03).ret();
    asm.finish()
}

pub const ITEM_METADATA: &str = r#"{
  "types": [
    {
      "namespace": "FlatBuffers",
      "name": "FlatBufferBuilder",
      "methods": [
        { "name": "StartTable", "is_public": true, "params": [{ "name": "numfields", "type": "System.Int32" }], "rva": "0x0" },
        { "name": "EndTable", "is_public": true, "return_type": "System.Int32", "rva": "0x1" },
        { "name": "AddLong", "is_public": true, "params": [
            { "name": "o", "type": "System.Int32" },
            { "name": "x", "type": "System.Int64" },
            { "name": "d", "type": "System.Int64" }
          ], "rva": "0x2" },
        { "name": "AddInt", "is_public": true, "params": [
            { "name": "o", "type": "System.Int32" },
            { "name": "x", "type": "System.Int32" },
            { "name": "d", "type": "System.Int32" }
          ], "rva": "0x3" }
      ]
    },
    {
      "namespace": "FlatData",
      "name": "Kind",
      "enum": {
        "underlying": "System.Int32",
        "members": [{ "name": "None", "value": 0 }, { "name": "Rare", "value": 1 }]
      }
    },
    {
      "namespace": "FlatData",
      "name": "Item",
      "interfaces": ["FlatBuffers.IFlatbufferObject"],
      "methods": [
        { "name": "CreateItem", "is_static": true, "is_public": true, "params": [
            { "name": "builder", "type": "FlatBuffers.FlatBufferBuilder" },
            { "name": "Id", "type": "System.Int64" },
            { "name": "Count", "type": "System.Int32" },
            { "name": "NameOffset", "type": "FlatBuffers.StringOffset" },
            { "name": "Kind", "type": "FlatData.Kind" }
          ], "return_type": "FlatBuffers.Offset<FlatData.Item>", "rva": "0x50" },
        { "name": "AddId", "is_static": true, "is_public": true, "params": [
            { "name": "builder", "type": "FlatBuffers.FlatBufferBuilder" },
            { "name": "Id", "type": "System.Int64" }
          ], "rva": "0x10" },
        { "name": "AddCount", "is_static": true, "is_public": true, "params": [
            { "name": "builder", "type": "FlatBuffers.FlatBufferBuilder" },
            { "name": "Count", "type": "System.Int32" }
          ], "rva": "0x20" },
        { "name": "AddName", "is_static": true, "is_public": true, "params": [
            { "name": "builder", "type": "FlatBuffers.FlatBufferBuilder" },
            { "name": "NameOffset", "type": "FlatBuffers.StringOffset" }
          ], "rva": "0x30" },
        { "name": "AddKind", "is_static": true, "is_public": true, "params": [
            { "name": "builder", "type": "FlatBuffers.FlatBufferBuilder" },
            { "name": "Kind", "type": "FlatData.Kind" }
          ], "rva": "0x80" },
        { "name": "EndItem", "is_static": true, "is_public": true, "params": [
            { "name": "builder", "type": "FlatBuffers.FlatBufferBuilder" }
          ], "return_type": "FlatBuffers.Offset<FlatData.Item>", "rva": "0x40" }
      ]
    },
    {
      "namespace": "FlatData",
      "name": "Ghost",
      "interfaces": ["FlatBuffers.IFlatbufferObject"],
      "methods": [
        { "name": "GetRootAsGhost", "is_static": true, "is_public": true, "params": [
            { "name": "_bb", "type": "FlatBuffers.ByteBuffer" }
          ] }
      ]
    },
    {
      "namespace": "FlatData",
      "name": "NotATable",
      "methods": []
    }
  ]
}"#;

pub const EXPECTED_SCHEMA: &str = "namespace FlatData;

enum Kind : int {
\tNone = 0,
\tRare = 1
}

table Item {
\tId: long (id: 0);
\tCount: int (id: 1);
\tKind: Kind (id: 2);
\tName: string; // slot unresolved
}

// construction metadata unavailable
table Ghost {
}

";
