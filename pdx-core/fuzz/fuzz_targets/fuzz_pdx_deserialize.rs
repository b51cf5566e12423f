#![no_main]

use libfuzzer_sys::fuzz_target;
use std::sync::{Arc, OnceLock};

use pdx_core::{
    Cacheable, InMemoryTypeService, ObjectDataInput, PdxReader, PdxSerializable, PdxSerializer,
    PdxWriter, Result, TypeRegistry, TypeService,
};

#[derive(Debug, Default)]
struct FuzzPdx {
    byte_val: i8,
    bool_val: bool,
    int_val: i32,
    double_val: f64,
    string_val: Option<String>,
    ints: Option<Vec<i32>>,
    object: Cacheable,
}

impl PdxSerializable for FuzzPdx {
    fn class_name(&self) -> &str {
        "fuzz.FuzzPdx"
    }

    fn to_data(&self, writer: &mut PdxWriter<'_>) -> Result<()> {
        writer.write_byte("byte", self.byte_val)?;
        writer.write_bool("bool", self.bool_val)?;
        writer.write_int("int", self.int_val)?;
        writer.write_double("double", self.double_val)?;
        writer.write_string("string", self.string_val.as_deref())?;
        writer.write_int_array("ints", self.ints.as_deref())?;
        writer.write_object("object", &self.object)
    }

    fn from_data(&mut self, reader: &mut PdxReader<'_>) -> Result<()> {
        self.byte_val = reader.read_byte("byte")?;
        self.bool_val = reader.read_bool("bool")?;
        self.int_val = reader.read_int("int")?;
        self.double_val = reader.read_double("double")?;
        self.string_val = reader.read_string("string")?;
        self.ints = reader.read_int_array("ints")?;
        self.object = reader.read_object("object")?;
        Ok(())
    }
}

fn serializer() -> &'static PdxSerializer {
    static SERIALIZER: OnceLock<PdxSerializer> = OnceLock::new();
    SERIALIZER.get_or_init(|| {
        let service: Arc<dyn TypeService> = Arc::new(InMemoryTypeService::new());
        let registry = Arc::new(TypeRegistry::new(service).expect("registry"));
        let serializer = PdxSerializer::new(registry);
        // Registers type id 1 so well-formed headers resolve.
        serializer
            .serialize(&FuzzPdx::default())
            .expect("seed serialization");
        serializer
    })
}

fuzz_target!(|data: &[u8]| {
    let serializer = serializer();
    let _ = serializer.deserialize(data);
    let _ = serializer.deserialize_as::<FuzzPdx>(data);

    let mut input = ObjectDataInput::new(data);
    let _ = Cacheable::read_from(&mut input, serializer.registry());
});
