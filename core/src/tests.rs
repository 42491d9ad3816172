#![cfg(test)]

use crate::{
    from_str, from_str_dyn, from_str_with, from_text,
    reader::{
        eat_item_separator_or_map_end, eat_map_key, eat_map_key_separator, eat_value,
        embedded_type_name, is_empty_map, parse_string,
    },
    schema::{lenient_name, SetFn},
    AccessorTable, Error, FieldAccessor, FieldValue, JsvSchema, Object, Options,
    PropertyConvention, Schema, SchemaBuilder, SchemaDescriptor, TypeFinder, TypeRegistry, Value,
};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate as jsv_typeref;

#[derive(Debug, Default, Clone, PartialEq, JsvSchema)]
#[jsv(name = "Zoo.Animal", kind = "abstract", rename_all = "PascalCase")]
struct Animal {
    name: String,
    legs: u32,
}

#[derive(Debug, Default, Clone, PartialEq, JsvSchema)]
#[jsv(name = "Zoo.Pet", base = "Animal", allow_runtime, rename_all = "PascalCase")]
struct Pet {
    name: String,
    legs: u32,
}

#[derive(Debug, Default, Clone, PartialEq, JsvSchema)]
#[jsv(name = "Zoo.Dog", base = "Pet", allow_runtime, rename_all = "PascalCase")]
struct Dog {
    name: String,
    legs: u32,
    breed: String,
    good_boy: bool,
}

#[derive(Debug, Default, Clone, PartialEq, JsvSchema)]
#[jsv(name = "Zoo.Cat", base = "Pet", rename_all = "PascalCase")]
struct Cat {
    name: String,
    lives: u8,
}

#[derive(Debug, Default, Clone, PartialEq, JsvSchema)]
#[jsv(name = "Toys.Dog", allow_runtime, rename_all = "PascalCase")]
struct ToyDog {
    name: String,
}

#[derive(Debug, Default, Clone, PartialEq, JsvSchema)]
#[jsv(name = "Garage.Car", allow_runtime, rename_all = "PascalCase")]
struct Car {
    model: String,
}

#[derive(Debug, Default, Clone, PartialEq, JsvSchema)]
#[jsv(name = "People.Person", rename_all = "PascalCase")]
struct Person {
    first_name: String,
    age: u8,
}

#[derive(Debug, Default, Clone, PartialEq, JsvSchema)]
#[jsv(name = "People.Address")]
struct Address {
    #[jsv(rename = "City")]
    city: String,
    #[jsv(rename = "Zip")]
    zip: Option<u32>,
}

#[derive(Debug, Default, JsvSchema)]
#[jsv(name = "People.Owner", rename_all = "PascalCase")]
struct Owner {
    name: String,
    #[jsv(polymorphic = "Pet")]
    pet: Option<Box<dyn Object>>,
    #[jsv(nested)]
    home: Address,
}

#[derive(Debug, Default, JsvSchema)]
#[jsv(name = "People.Keeper", rename_all = "PascalCase")]
struct Keeper {
    name: String,
    #[jsv(polymorphic = "Animal")]
    animal: Option<Box<dyn Object>>,
}

#[derive(Debug, Default, JsvSchema)]
#[jsv(name = "Zoo.Puppy", base = "Pet", allow_runtime)]
struct Puppy {}

#[derive(Debug, Default, JsvSchema)]
#[jsv(name = "Zoo.Mimic", base = "Pet", allow_runtime)]
struct Mimic {}

#[derive(Debug, Default, JsvSchema)]
#[jsv(name = "Zoo.Stray", base = "Pet", allow_runtime)]
struct Stray {}

#[derive(Debug, Default, Clone, PartialEq, JsvSchema)]
#[jsv(name = "Shop.Bag", on_before_set = "before_set", rename_all = "PascalCase")]
struct Bag {
    title: String,
    count: u32,
    #[jsv(skip)]
    extra: HashMap<String, String>,
}

impl Bag {
    fn before_set(&mut self, name: &str, value: FieldValue) -> FieldValue {
        match value.downcast::<String>() {
            Ok(text) if name == "Title" => Box::new(text.to_uppercase()) as FieldValue,
            Ok(text) => {
                self.extra.insert(name.to_owned(), (*text).to_owned());
                text as FieldValue
            }
            Err(value) => value,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, JsvSchema)]
#[jsv(name = "Shop.Invoice", rename_all = "PascalCase")]
struct Invoice {
    number: u32,
    #[jsv(read_only)]
    total: u64,
}

#[derive(Debug, Default, Clone, PartialEq, JsvSchema)]
#[jsv(name = "Misc.Document", rename_all = "PascalCase")]
struct Document {
    title: String,
    #[jsv(dynamic)]
    meta: Value,
}

#[derive(Debug, Default, Clone, PartialEq, JsvSchema)]
#[jsv(name = "Misc.Stamped", rename_all = "PascalCase")]
struct Stamped {
    #[jsv(flatten)]
    pet: Pet,
    stamp: u64,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Manual {
    id: u32,
    label: String,
}

impl Schema for Manual {
    fn schema() -> SchemaBuilder<Self> {
        SchemaBuilder::new("Misc.Manual")
            .field("id", |this: &mut Self| &mut this.id)
            .field("label", |this: &mut Self| &mut this.label)
    }
}

#[derive(Debug, Default, Clone, PartialEq, JsvSchema)]
#[jsv(name = "Misc.Empty")]
struct Empty {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Shape {
    Point,
    Circle(f32),
    Rect { w: u32, h: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Plain {
    name: String,
    age: u8,
    nick: Option<String>,
}

fn zoo() -> TypeRegistry {
    let registry = TypeRegistry::default();
    registry.register::<Dog>();
    registry.register::<Cat>();
    registry.register::<Car>();
    registry
}

fn parse<T>(text: &str, registry: &TypeRegistry, options: &Options) -> T
where
    T: Schema,
{
    from_str_with::<T>(text, registry, options).unwrap().unwrap()
}

fn parse_dyn<T>(text: &str, registry: &TypeRegistry, options: &Options) -> Box<dyn Object>
where
    T: Schema,
{
    from_str_dyn::<T>(text, registry, options).unwrap().unwrap()
}

#[test]
fn test_reader_entries() {
    let text = r#"{Name:"Rex, the dog",Tags:[a,b],Owner:{Name:Bob},Age:3}"#;
    let mut index = 1;
    let mut entries = vec![];
    while index < text.len() {
        let key = eat_map_key(text, &mut index);
        eat_map_key_separator(text, &mut index);
        let value = eat_value(text, &mut index);
        eat_item_separator_or_map_end(text, &mut index);
        entries.push((key, value));
    }
    assert_eq!(
        entries,
        vec![
            ("Name", "\"Rex, the dog\""),
            ("Tags", "[a,b]"),
            ("Owner", "{Name:Bob}"),
            ("Age", "3"),
        ]
    );

    let text = r#"{A:{B:"x}y"},C:1}"#;
    let mut index = 1;
    assert_eq!(eat_map_key(text, &mut index), "A");
    eat_map_key_separator(text, &mut index);
    assert_eq!(eat_value(text, &mut index), r#"{B:"x}y"}"#);

    let text = "{A:,B:2}";
    let mut index = 1;
    assert_eq!(eat_map_key(text, &mut index), "A");
    eat_map_key_separator(text, &mut index);
    assert_eq!(eat_value(text, &mut index), "");
    eat_item_separator_or_map_end(text, &mut index);
    assert_eq!(eat_map_key(text, &mut index), "B");
}

#[test]
fn test_reader_strings() {
    assert!(is_empty_map("{}"));
    assert!(is_empty_map("{  }"));
    assert!(is_empty_map("{"));
    assert!(!is_empty_map("{A:1}"));

    assert_eq!(parse_string("plain"), "plain");
    assert_eq!(parse_string("\"a,b\""), "a,b");
    assert_eq!(parse_string("\"say \"\"hi\"\"\""), "say \"hi\"");
    assert!(matches!(parse_string("\"x\""), Cow::Borrowed(_)));

    assert_eq!(
        embedded_type_name(r#"{__type:"Zoo.Dog",Name:Rex}"#, "__type").as_deref(),
        Some("Zoo.Dog")
    );
    assert_eq!(
        embedded_type_name("{__TYPE:Zoo.Cat}", "__type").as_deref(),
        Some("Zoo.Cat")
    );
    assert_eq!(embedded_type_name("{Name:Rex}", "__type"), None);
    assert_eq!(embedded_type_name("Rex", "__type"), None);
}

#[test]
fn test_value() {
    let value = Value::parse(r#"{a:1,b:[x,"y,z"],c:{d:},e:[]}"#).unwrap();
    assert_eq!(
        value,
        Value::map()
            .property("a", "1")
            .property("b", Value::seq().item("x").item("y,z"))
            .property("c", Value::map().property("d", ()))
            .property("e", Value::seq())
    );
    assert_eq!(value.get("a").and_then(Value::as_str), Some("1"));
    assert!(value.get("c").unwrap().get("d").unwrap().is_null());
    assert_eq!(Value::parse("").unwrap(), Value::Null);
    assert_eq!(Value::parse("\"\"\"\"").unwrap(), Value::from("\""));

    let json = serde_json::to_string(&value).unwrap();
    assert_eq!(
        json,
        r#"{"a":"1","b":["x","y,z"],"c":{"d":null},"e":[]}"#
    );
    let back = serde_json::from_str::<Value>(&json).unwrap();
    assert_eq!(back, value);
}

#[test]
fn test_from_text() {
    assert_eq!(from_text::<Vec<u32>>("[1,2,3]").unwrap(), vec![1, 2, 3]);
    assert_eq!(from_text::<bool>("TRUE").unwrap(), true);
    assert_eq!(from_text::<char>("x").unwrap(), 'x');
    assert_eq!(from_text::<Option<i32>>("").unwrap(), None);
    assert_eq!(from_text::<Option<i32>>("-7").unwrap(), Some(-7));
    assert_eq!(
        from_text::<HashMap<u32, String>>("{1:one,2:two}").unwrap(),
        vec![(1, "one".to_owned()), (2, "two".to_owned())]
            .into_iter()
            .collect::<HashMap<_, _>>()
    );
    assert_eq!(from_text::<Shape>("Point").unwrap(), Shape::Point);
    assert_eq!(from_text::<Shape>("{Circle:1.5}").unwrap(), Shape::Circle(1.5));
    assert_eq!(
        from_text::<Shape>("{Rect:{w:2,h:3}}").unwrap(),
        Shape::Rect { w: 2, h: 3 }
    );
    assert_eq!(
        from_text::<Plain>(r#"{name:"Ann, B",age:30,nick:}"#).unwrap(),
        Plain {
            name: "Ann, B".to_owned(),
            age: 30,
            nick: None,
        }
    );
    assert!(matches!(from_text::<u8>("many"), Err(Error::CannotParse(_))));
    assert!(from_text::<Shape>("{Hexagon:1}").is_err());
}

#[test]
fn test_accessor_table() {
    let table = Person::schema().build();
    assert_eq!(table.names().collect::<Vec<_>>(), vec!["FirstName", "Age"]);
    assert!(table.get("FirstName", PropertyConvention::Strict).is_some());
    assert!(table.get("firstName", PropertyConvention::Strict).is_none());
    assert_eq!(
        table
            .get("first_name", PropertyConvention::Lenient)
            .map(|accessor| accessor.name()),
        Some("FirstName")
    );
    assert_eq!(
        table
            .get("FIRST-NAME", PropertyConvention::Lenient)
            .map(|accessor| accessor.declared_type()),
        Some(std::any::type_name::<String>())
    );
    assert_eq!(lenient_name("First_Name-X"), "firstnamex");

    let mut table = AccessorTable::default();
    let noop: SetFn = Arc::new(|_: &mut dyn Object, _: FieldValue| Ok(()));
    table.insert(FieldAccessor::new("A", "first", noop.clone()));
    table.insert(FieldAccessor::new("B", "second", noop.clone()));
    table.insert(FieldAccessor::new("A", "replaced", noop));
    assert_eq!(table.len(), 2);
    assert_eq!(
        table
            .get("A", PropertyConvention::Strict)
            .map(|accessor| accessor.declared_type()),
        Some("replaced")
    );
}

#[test]
fn test_registry() {
    let registry = zoo();
    assert!(registry.is_registered::<Dog>());
    // dependencies come along
    assert!(registry.is_registered::<Pet>());
    assert!(registry.is_registered::<Animal>());
    assert!(!registry.is_registered::<ToyDog>());
    let before = registry.len();
    registry.register::<Dog>();
    assert_eq!(registry.len(), before);

    let find = |name: &str| registry.find(name).map(|d| d.name().to_owned());
    assert_eq!(find("Zoo.Dog").as_deref(), Some("Zoo.Dog"));
    assert_eq!(find("zoo.dog").as_deref(), Some("Zoo.Dog"));
    assert_eq!(find("Dog").as_deref(), Some("Zoo.Dog"));
    assert_eq!(find("Unicorn"), None);

    registry.register::<ToyDog>();
    assert_eq!(find("Dog"), None);
    assert_eq!(find("Toys.Dog").as_deref(), Some("Toys.Dog"));
    registry.unregister::<ToyDog>();
    assert_eq!(find("Dog").as_deref(), Some("Zoo.Dog"));

    let dog = registry.get::<Dog>().unwrap();
    let pet = registry.get::<Pet>().unwrap();
    let animal = registry.get::<Animal>().unwrap();
    let car = registry.get::<Car>().unwrap();
    assert!(registry.is_assignable(&animal, &dog));
    assert!(registry.is_assignable(&pet, &dog));
    assert!(registry.is_assignable(&dog, &dog));
    assert!(!registry.is_assignable(&dog, &pet));
    assert!(!registry.is_assignable(&pet, &car));
    assert!(!animal.is_instantiable());
    assert!(matches!(animal.create(), Err(Error::NotInstantiable(_))));

    let first = registry.accessors(&dog).unwrap();
    let second = registry.accessors(&dog).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    let empty = SchemaDescriptor::of::<Empty>();
    assert!(registry.accessors(&empty).is_none());

    registry.unregister_all();
    assert!(registry.is_empty());
}

#[test]
fn test_plain_map() {
    let registry = zoo();
    let options = Options::default();
    assert_eq!(
        parse::<Pet>("{Name:Rex,Legs:4}", &registry, &options),
        Pet {
            name: "Rex".to_owned(),
            legs: 4,
        }
    );
    assert_eq!(
        parse::<Pet>("{Name:Rex, Legs:4}  ", &registry, &options).legs,
        4
    );
    assert_eq!(
        parse::<Pet>("{Name:Rex,Color:brown,Legs:3}", &registry, &options),
        Pet {
            name: "Rex".to_owned(),
            legs: 3,
        }
    );
    assert_eq!(
        parse::<Manual>(r#"{id:7,label:"a ""quoted"" label"}"#, &registry, &options),
        Manual {
            id: 7,
            label: "a \"quoted\" label".to_owned(),
        }
    );
}

#[test]
fn test_empty_input() {
    let registry = zoo();
    let options = Options::default();
    assert!(from_str_with::<Pet>("", &registry, &options)
        .unwrap()
        .is_none());
    assert!(from_str_with::<Pet>("  \n", &registry, &options)
        .unwrap()
        .is_none());
    assert_eq!(parse::<Pet>("{}", &registry, &options), Pet::default());
    assert_eq!(parse::<Dog>("{ }", &registry, &options), Dog::default());
    assert!(matches!(
        from_str_with::<Pet>("Name:Rex", &registry, &options),
        Err(Error::MalformedPayload(..))
    ));
    assert!(matches!(
        from_str_dyn::<Animal>("{}", &registry, &options),
        Err(Error::NotInstantiable(_))
    ));
}

#[test]
fn test_type_hint() {
    let registry = zoo();
    let options = Options::default();
    let text = r#"{__type:"Zoo.Dog",Name:Rex,Legs:4,Breed:Corgi,GoodBoy:true}"#;
    let expected = Dog {
        name: "Rex".to_owned(),
        legs: 4,
        breed: "Corgi".to_owned(),
        good_boy: true,
    };

    let object = parse_dyn::<Pet>(text, &registry, &options);
    assert_eq!(object.downcast_ref::<Dog>(), Some(&expected));

    let object = parse_dyn::<Animal>(text, &registry, &options);
    assert!(object.is::<Dog>());
    assert_eq!(*object.downcast::<Dog>().unwrap(), expected);

    let object = parse_dyn::<Pet>("{__TYPE:dog,Breed:Pug}", &registry, &options);
    assert_eq!(object.downcast_ref::<Dog>().unwrap().breed, "Pug");

    // a hint naming the target itself keeps the target
    let object = parse_dyn::<Pet>("{__type:Zoo.Pet,Name:Rex}", &registry, &options);
    assert!(object.is::<Pet>());

    assert!(matches!(
        from_str_with::<Pet>(text, &registry, &options),
        Err(Error::UnexpectedType(..))
    ));
}

#[test]
fn test_ignored_type_hint() {
    let registry = zoo();
    let options = Options::default();
    let expected = Pet {
        name: "Rex".to_owned(),
        legs: 0,
    };
    assert_eq!(
        parse::<Pet>("{__type:Zoo.Unicorn,Name:Rex}", &registry, &options),
        expected
    );
    assert_eq!(
        parse::<Pet>("{__type:Garage.Car,Name:Rex}", &registry, &options),
        expected
    );
    assert_eq!(
        parse::<Pet>("{__type:Zoo.Animal,Name:Rex}", &registry, &options),
        expected
    );
    // single character values never count as type hints
    assert_eq!(parse::<Pet>("{__type:x,Name:Rex}", &registry, &options), expected);
    assert_eq!(
        parse::<Pet>("{Name:Rex,__type:}", &registry, &options),
        expected
    );
}

#[test]
fn test_forbidden_type() {
    let registry = zoo();
    let text = "{__type:Zoo.Cat,Name:Tom,Lives:9}";
    assert!(matches!(
        from_str_dyn::<Pet>(text, &registry, &Options::default()),
        Err(Error::ForbiddenType(name)) if name == "Zoo.Cat"
    ));

    let options = Options::default().with_allowed_runtime_type("Zoo.Cat");
    let object = parse_dyn::<Pet>(text, &registry, &options);
    assert_eq!(object.downcast_ref::<Cat>().unwrap().lives, 9);

    let options = Options::default().with_allow_runtime_type(|d| d.name() != "Zoo.Dog");
    assert!(matches!(
        from_str_dyn::<Pet>("{__type:Zoo.Dog}", &registry, &options),
        Err(Error::ForbiddenType(_))
    ));
    assert!(from_str_dyn::<Pet>(text, &registry, &options).is_ok());

    // forbidden even under warn policy and when nested
    registry.register::<Owner>();
    assert!(matches!(
        from_str_dyn::<Owner>(
            "{Name:Ann,Pet:{__type:Zoo.Cat,Name:Tom}}",
            &registry,
            &Options::default()
        ),
        Err(Error::ForbiddenType(_))
    ));
}

#[test]
fn test_late_type_hint_replaces_instance() {
    let registry = zoo();
    let object = parse_dyn::<Pet>(
        "{Name:Rex,__type:Zoo.Dog,Breed:Corgi}",
        &registry,
        &Options::default(),
    );
    let dog = object.downcast_ref::<Dog>().unwrap();
    assert_eq!(dog.name, "");
    assert_eq!(dog.breed, "Corgi");
}

#[test]
fn test_property_convention() {
    let registry = TypeRegistry::default();
    let text = "{first_name:Ann,AGE:30}";
    assert_eq!(
        parse::<Person>(text, &registry, &Options::default()),
        Person::default()
    );
    let options = Options::default().with_property_convention(PropertyConvention::Lenient);
    assert_eq!(
        parse::<Person>(text, &registry, &options),
        Person {
            first_name: "Ann".to_owned(),
            age: 30,
        }
    );
    assert_eq!(
        parse::<Person>("{first-name:Bo}", &registry, &options).first_name,
        "Bo"
    );
}

#[test]
fn test_error_policy() {
    let registry = zoo();
    let text = "{Name:Rex,Legs:many}";
    assert_eq!(
        parse::<Pet>(text, &registry, &Options::default()),
        Pet {
            name: "Rex".to_owned(),
            legs: 0,
        }
    );

    let options = Options::default().with_throw_on_error(true);
    match from_str_with::<Pet>(text, &registry, &options) {
        Err(error @ Error::FieldApply(..)) => {
            let message = error.to_string();
            assert!(message.contains("'Legs'"));
            assert!(message.contains("'many'"));
            assert!(message.contains("u32"));
        }
        result => panic!("unexpected result: {:?}", result),
    }

    let reports = Arc::new(Mutex::new(vec![]));
    let captured = reports.clone();
    let options = Options::default().with_on_error(move |context| {
        captured.lock().unwrap().push((
            context.instance.type_name().to_owned(),
            context.field.to_owned(),
            context.raw.to_owned(),
            context.declared_type.to_owned(),
        ));
    });
    let pet = parse::<Pet>("{Name:Rex,Legs:many,Name:Max}", &registry, &options);
    assert_eq!(pet.name, "Max");
    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].0.ends_with("Pet"));
    assert_eq!(reports[0].1, "Legs");
    assert_eq!(reports[0].2, "many");
    assert_eq!(reports[0].3, "u32");
}

#[test]
fn test_unsupported_operation() {
    let registry = TypeRegistry::default();
    for options in [
        Options::default(),
        Options::default().with_throw_on_error(true),
    ] {
        assert!(matches!(
            from_str_with::<Invoice>("{Number:1,Total:5}", &registry, &options),
            Err(Error::UnsupportedOperation(field, _)) if field == "Total"
        ));
    }
    assert_eq!(
        parse::<Invoice>("{Number:1}", &registry, &Options::default()).number,
        1
    );
}

#[test]
fn test_before_set_hook() {
    let registry = TypeRegistry::default();
    let bag = parse::<Bag>(
        "{Title:tea,Count:2,Color:red,Size:}",
        &registry,
        &Options::default(),
    );
    assert_eq!(bag.title, "TEA");
    assert_eq!(bag.count, 2);
    assert_eq!(bag.extra.get("Color").map(String::as_str), Some("red"));
    assert_eq!(bag.extra.get("Size").map(String::as_str), Some(""));
    assert_eq!(bag.extra.len(), 2);

    // whitespace after a quoted value is not an entry of its own
    let bag = parse::<Bag>(
        r#"{Title:"tea" ,Color:red,Size:{a:1}  ,Count:3}"#,
        &registry,
        &Options::default(),
    );
    assert_eq!(bag.title, "TEA");
    assert_eq!(bag.count, 3);
    assert_eq!(bag.extra.len(), 2);
    assert!(!bag.extra.contains_key(""));
}

#[test]
fn test_embedded_type() {
    let registry = zoo();
    registry.register::<Owner>();
    let options = Options::default();

    let owner = parse::<Owner>(
        "{Name:Ann,Pet:{__type:Zoo.Dog,Name:Rex,Breed:Corgi},Home:{City:Oslo,Zip:150}}",
        &registry,
        &options,
    );
    assert_eq!(owner.name, "Ann");
    let dog = owner.pet.as_deref().unwrap().downcast_ref::<Dog>().unwrap();
    assert_eq!(dog.name, "Rex");
    assert_eq!(dog.breed, "Corgi");
    assert_eq!(
        owner.home,
        Address {
            city: "Oslo".to_owned(),
            zip: Some(150),
        }
    );

    let owner = parse::<Owner>("{Pet:{Name:Tom,Legs:4}}", &registry, &options);
    assert_eq!(
        owner.pet.unwrap().downcast_ref::<Pet>(),
        Some(&Pet {
            name: "Tom".to_owned(),
            legs: 4,
        })
    );

    // unassignable embedded type falls back to the declared type
    let owner = parse::<Owner>("{Pet:{__type:Garage.Car,Name:Tom}}", &registry, &options);
    assert_eq!(owner.pet.unwrap().downcast_ref::<Pet>().unwrap().name, "Tom");

    // unknown embedded type falls back to the declared type
    let owner = parse::<Owner>("{Pet:{__type:Zoo.Yeti,Name:Tom}}", &registry, &options);
    assert!(owner.pet.unwrap().is::<Pet>());

    // a forbidden type that does not fit the field is ignored, not refused
    let owner = parse::<Owner>("{Home:{__type:Zoo.Cat,City:Oslo}}", &registry, &options);
    assert_eq!(owner.home.city, "Oslo");

    let owner = parse::<Owner>("{Name:Ann,Pet:}", &registry, &options);
    assert!(owner.pet.is_none());
    assert_eq!(owner.home, Address::default());
}

#[test]
fn test_nested_field_failure() {
    let registry = zoo();
    registry.register::<Owner>();
    registry.register::<Keeper>();

    let owner = parse::<Owner>("{Name:Ann,Home:Oslo}", &registry, &Options::default());
    assert_eq!(owner.name, "Ann");
    assert_eq!(owner.home, Address::default());

    let keeper = parse::<Keeper>("{Name:Ann,Animal:{Name:Tom}}", &registry, &Options::default());
    assert_eq!(keeper.name, "Ann");
    assert!(keeper.animal.is_none());

    let keeper = parse::<Keeper>(
        "{Name:Ann,Animal:{__type:Zoo.Dog,Name:Tom}}",
        &registry,
        &Options::default(),
    );
    assert_eq!(
        keeper.animal.unwrap().downcast_ref::<Dog>().unwrap().name,
        "Tom"
    );

    let options = Options::default().with_throw_on_error(true);
    assert!(matches!(
        from_str_with::<Owner>("{Name:Ann,Home:Oslo}", &registry, &options),
        Err(Error::FieldApply(field, _, _, cause))
            if field == "Home" && matches!(*cause, Error::MalformedPayload(..))
    ));
    assert!(matches!(
        from_str_with::<Keeper>("{Name:Ann,Animal:{Name:Tom}}", &registry, &options),
        Err(Error::FieldApply(field, _, _, cause))
            if field == "Animal" && matches!(*cause, Error::NotInstantiable(..))
    ));

    let reports = Arc::new(Mutex::new(vec![]));
    let captured = reports.clone();
    let options = Options::default().with_on_error(move |context| {
        captured.lock().unwrap().push(context.field.to_owned());
    });
    let owner = parse::<Owner>("{Home:Oslo,Name:Bo}", &registry, &options);
    assert_eq!(owner.name, "Bo");
    assert_eq!(*reports.lock().unwrap(), vec!["Home".to_owned()]);
}

#[test]
fn test_typed_map_in_plain_fields() {
    let registry = zoo();
    let text = "{Title:T,Meta:{__type:Zoo.Dog,Name:Rex}}";
    let expected = Value::map()
        .property("__type", "Zoo.Dog")
        .property("Name", "Rex");

    let options = Options::default().with_throw_on_error(true);
    let document = parse::<Document>(text, &registry, &options);
    assert_eq!(document.meta, expected);

    let hits = Arc::new(Mutex::new(0));
    let captured = hits.clone();
    let options = Options::default().with_on_error(move |_| *captured.lock().unwrap() += 1);
    let document = parse::<Document>(text, &registry, &options);
    assert_eq!(document.title, "T");
    assert_eq!(document.meta, expected);
    assert_eq!(*hits.lock().unwrap(), 0);

    let options = Options::default().with_throw_on_error(true);
    let manual = parse::<Manual>(
        r#"{id:1,label:"{__type:Zoo.Dog}"}"#,
        &registry,
        &options,
    );
    assert_eq!(manual.label, "{__type:Zoo.Dog}");
}

#[test]
fn test_depth_limit() {
    assert!(Value::parse_bounded("[[[]]]", 3).is_ok());
    assert!(matches!(
        Value::parse_bounded("[[[]]]", 2),
        Err(Error::DepthLimitExceeded(2))
    ));
    assert!(matches!(
        from_text::<Vec<Vec<u8>>>(&"[".repeat(10_000)),
        Err(Error::DepthLimitExceeded(_))
    ));

    let registry = zoo();
    let text = format!("{{Title:Deep,Meta:{}}}", "[".repeat(200_000));
    let document = parse::<Document>(&text, &registry, &Options::default());
    assert_eq!(document.title, "Deep");
    assert!(document.meta.is_null());
    assert!(matches!(
        from_str_with::<Document>(&text, &registry, &Options::default().with_throw_on_error(true)),
        Err(Error::FieldApply(_, _, _, cause)) if matches!(*cause, Error::DepthLimitExceeded(_))
    ));

    registry.register::<Owner>();
    let options = Options::default().with_max_depth(1);
    let owner = parse::<Owner>("{Name:Ann,Home:{City:Oslo}}", &registry, &options);
    assert_eq!(owner.name, "Ann");
    assert_eq!(owner.home, Address::default());
    let options = Options::default().with_max_depth(2);
    let owner = parse::<Owner>("{Name:Ann,Home:{City:Oslo}}", &registry, &options);
    assert_eq!(owner.home.city, "Oslo");
}

#[test]
fn test_custom_factory() {
    let registry = zoo();
    registry.register_descriptor(
        SchemaDescriptor::of::<Puppy>().with_factory(|| {
            Box::new(Dog {
                breed: "Puppy".to_owned(),
                ..Default::default()
            }) as Box<dyn Object>
        }),
    );
    registry.register_descriptor(
        SchemaDescriptor::of::<Mimic>()
            .with_factory(|| Box::new(Car::default()) as Box<dyn Object>),
    );
    let options = Options::default();

    // produced type fits the target, so it is kept and its fields apply
    let object = parse_dyn::<Pet>("{__type:Zoo.Puppy,Name:Rex,Legs:4}", &registry, &options);
    let dog = object.downcast_ref::<Dog>().unwrap();
    assert_eq!(dog.name, "Rex");
    assert_eq!(dog.legs, 4);
    assert_eq!(dog.breed, "Puppy");

    // produced type does not fit, so the hint is dropped
    let object = parse_dyn::<Pet>("{__type:Zoo.Mimic,Name:Rex}", &registry, &options);
    assert_eq!(
        object.downcast_ref::<Pet>(),
        Some(&Pet {
            name: "Rex".to_owned(),
            legs: 0,
        })
    );
}

#[test]
fn test_derived_type_without_fields() {
    let registry = zoo();
    registry.register::<Stray>();
    let empty = registry.get::<Stray>().unwrap();
    assert!(registry.accessors(&empty).is_none());

    let reports = Arc::new(Mutex::new(vec![]));
    let captured = reports.clone();
    let options = Options::default().with_on_error(move |context| {
        captured
            .lock()
            .unwrap()
            .push((context.instance.type_name().to_owned(), context.field.to_owned()));
    });
    let object = parse_dyn::<Pet>("{__type:Zoo.Stray,Name:Rex}", &registry, &options);
    assert!(object.is::<Stray>());
    // target table stays in place, so the field is looked up but cannot land on the instance
    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].0.ends_with("Stray"));
    assert_eq!(reports[0].1, "Name");
}

#[test]
fn test_dynamic_and_flatten() {
    let registry = TypeRegistry::default();
    let options = Options::default();
    let document = parse::<Document>(
        "{Title:Report,Meta:{tags:[a,b],pages:12}}",
        &registry,
        &options,
    );
    assert_eq!(document.title, "Report");
    assert_eq!(
        document.meta,
        Value::map()
            .property("tags", Value::seq().item("a").item("b"))
            .property("pages", 12)
    );

    let stamped = parse::<Stamped>("{Name:Rex,Legs:3,Stamp:99}", &registry, &options);
    assert_eq!(
        stamped,
        Stamped {
            pet: Pet {
                name: "Rex".to_owned(),
                legs: 3,
            },
            stamp: 99,
        }
    );
}

#[test]
fn test_type_finder() {
    let registry = zoo();
    let options = Options::default().with_type_finder(|name: &str| {
        if name == "Alias" {
            Some(Arc::new(SchemaDescriptor::of::<Dog>()))
        } else {
            None
        }
    });
    let object = parse_dyn::<Pet>("{__type:Alias,Breed:Pug}", &registry, &options);
    assert!(object.is::<Dog>());
    let object = parse_dyn::<Pet>("{__type:Zoo.Dog,Breed:Pug}", &registry, &options);
    assert!(object.is::<Pet>());

    let options = Options::default().with_type_attr("$type");
    let object = parse_dyn::<Pet>("{$type:Zoo.Dog,Breed:Pug}", &registry, &options);
    assert!(object.is::<Dog>());
}

#[test]
fn test_idempotence() {
    let registry = zoo();
    let options = Options::default();
    let text = r#"{__type:Zoo.Dog,Name:"Rex, Jr.",Legs:4,Breed:Corgi}"#;
    let first = parse_dyn::<Pet>(text, &registry, &options);
    let second = parse_dyn::<Pet>(text, &registry, &options);
    assert_eq!(
        first.downcast_ref::<Dog>().unwrap(),
        second.downcast_ref::<Dog>().unwrap()
    );
}

#[test]
fn test_concurrent_sessions() {
    let registry = zoo();
    let options = Options::default();
    std::thread::scope(|scope| {
        let handles = (0..8)
            .map(|thread| {
                let registry = &registry;
                let options = &options;
                scope.spawn(move || {
                    for index in 0..50 {
                        let text = format!(
                            "{{__type:Zoo.Dog,Name:Dog{},Legs:{},Breed:Mutt}}",
                            thread, index
                        );
                        let object = parse_dyn::<Animal>(&text, registry, options);
                        let dog = object.downcast_ref::<Dog>().unwrap();
                        assert_eq!(dog.name, format!("Dog{}", thread));
                        assert_eq!(dog.legs, index);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }
    });
    let dog = registry.get::<Dog>().unwrap();
    assert_eq!(registry.accessors(&dog).unwrap().len(), 4);
}

#[test]
fn test_round_trip() {
    let registry = zoo();
    let options = Options::default();
    let dog = Dog {
        name: "Rex, \"the\" dog".to_owned(),
        legs: 4,
        breed: "Corgi".to_owned(),
        good_boy: true,
    };
    let value = Value::map()
        .property("__type", "Zoo.Dog")
        .property("Name", dog.name.as_str())
        .property("Legs", dog.legs)
        .property("Breed", dog.breed.as_str())
        .property("GoodBoy", dog.good_boy);
    let text = write_jsv(&value);
    let object = parse_dyn::<Pet>(&text, &registry, &options);
    assert_eq!(object.downcast_ref::<Dog>(), Some(&dog));
}

#[test]
fn test_round_trip_instance() {
    let registry = zoo();
    registry.register::<Owner>();
    let options = Options::default();
    let text = r#"{Name:"Ann, Jr.",Pet:{__type:Zoo.Dog,Name:Rex,Legs:4,Breed:Corgi,GoodBoy:true},Home:{City:Oslo,Zip:}}"#;
    let first = parse::<Owner>(text, &registry, &options);
    let written = write_jsv(&owner_value(&first));
    let second = parse::<Owner>(&written, &registry, &options);
    assert_eq!(second.name, first.name);
    assert_eq!(second.home, first.home);
    assert_eq!(
        second.pet.as_deref().unwrap().downcast_ref::<Dog>(),
        first.pet.as_deref().unwrap().downcast_ref::<Dog>()
    );
    assert_eq!(write_jsv(&owner_value(&second)), written);
}

fn owner_value(owner: &Owner) -> Value {
    let pet = match owner.pet.as_deref().and_then(|pet| pet.downcast_ref::<Dog>()) {
        Some(dog) => Value::map()
            .property("__type", "Zoo.Dog")
            .property("Name", dog.name.as_str())
            .property("Legs", dog.legs)
            .property("Breed", dog.breed.as_str())
            .property("GoodBoy", dog.good_boy),
        None => Value::Null,
    };
    Value::map()
        .property("Name", owner.name.as_str())
        .property("Pet", pet)
        .property(
            "Home",
            Value::map()
                .property("City", owner.home.city.as_str())
                .property("Zip", owner.home.zip),
        )
}

fn write_jsv(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => {
            if text.contains(|c: char| matches!(c, ',' | ':' | '{' | '}' | '[' | ']' | '"')) {
                format!("\"{}\"", text.replace('"', "\"\""))
            } else {
                text.to_owned()
            }
        }
        Value::Seq(items) => format!(
            "[{}]",
            items.iter().map(write_jsv).collect::<Vec<_>>().join(",")
        ),
        Value::Map(entries) => format!(
            "{{{}}}",
            entries
                .iter()
                .map(|(key, value)| format!("{}:{}", key, write_jsv(value)))
                .collect::<Vec<_>>()
                .join(",")
        ),
    }
}

#[test]
fn test_global_registry() {
    TypeRegistry::global().register::<Dog>();
    let dog = from_str::<Dog>("{Name:Rex,GoodBoy:true}").unwrap().unwrap();
    assert!(dog.good_boy);
    assert!(matches!(
        from_str::<Pet>("{__type:Zoo.Dog,Name:Rex}"),
        Err(Error::UnexpectedType(..))
    ));
    assert!(from_str::<Pet>("").unwrap().is_none());
}
