use mdb_mdf::{parse_model, MdfSource, ModelTarget, ParseOptions};
use proptest::prelude::*;
use serde_yaml::{Mapping, Value};

fn document_with_desc(desc: &str, definition: &str) -> String {
    let mut prop = Mapping::new();
    prop.insert("Desc".into(), desc.into());
    prop.insert("Type".into(), "string".into());
    let mut props = Mapping::new();
    props.insert("p".into(), Value::Mapping(prop));

    let mut term = Mapping::new();
    term.insert("Value".into(), "v".into());
    term.insert("Origin".into(), "o".into());
    term.insert("Definition".into(), definition.into());
    let mut terms = Mapping::new();
    terms.insert("t".into(), Value::Mapping(term));

    let mut root = Mapping::new();
    root.insert("Handle".into(), "P".into());
    root.insert("Version".into(), "1.0.0".into());
    root.insert("PropDefinitions".into(), Value::Mapping(props));
    root.insert("Terms".into(), Value::Mapping(terms));
    serde_yaml::to_string(&Value::Mapping(root)).unwrap()
}

proptest! {
    #[test]
    fn parsed_free_text_matches_source(
        desc in "[ -~\n]{1,80}",
        definition in "[a-z'\"\\\\ \n]{1,80}",
    ) {
        let text = document_with_desc(&desc, &definition);
        let model = parse_model(
            &[MdfSource::new("gen.yml", text)],
            &ModelTarget::default(),
            &ParseOptions::default(),
        ).unwrap();
        prop_assert_eq!(model.properties["p"].desc.as_deref(), Some(desc.as_str()));
        prop_assert_eq!(model.terms["t"].definition.as_deref(), Some(definition.as_str()));
    }
}
