//! Tests for environment construction, globals and contexts

use maplit::hashmap;

use crate::compiler::CompileMode;
use crate::config::EnvConfig;
use crate::environment::Environment;
use crate::error::{ConfigError, Error};
use crate::ext::TryCatchExtension;
use crate::runtime::{Context, UndefinedBehavior, Value};

#[test]
fn test_from_config_registers_named_extensions() -> anyhow::Result<()> {
    let config = EnvConfig::from_toml_str(
        r#"
        extensions = ["try_catch", "do"]
        enable_async = true
        native = true
        undefined = "strict"
        "#,
    )?;
    let env = Environment::from_config(&config)?;
    assert_eq!(env.mode(), CompileMode::NATIVE_ASYNC);
    assert_eq!(env.undefined(), UndefinedBehavior::Strict);

    let mut names = env.extension_names();
    names.sort_unstable();
    assert_eq!(names, vec!["do", "try_catch"]);
    Ok(())
}

#[test]
fn test_from_config_rejects_unknown_extension() {
    let config = EnvConfig {
        extensions: vec!["loopcontrols".to_string()],
        ..EnvConfig::default()
    };
    let err = Environment::from_config(&config).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownExtension(name) if name == "loopcontrols"));
}

#[test]
fn test_try_tag_requires_extension() {
    let env = Environment::new();
    let err = env.from_string("{% try %}a{% endtry %}").unwrap_err();
    assert!(err.message.contains("try"), "{}", err.message);
}

#[test]
fn test_globals_are_shadowed_by_context() -> anyhow::Result<()> {
    let env = Environment::builder()
        .extension(TryCatchExtension)
        .global("site", "globals")
        .build();
    let template = env.from_string("{{ site }}")?;

    assert_eq!(template.render_to_string(&Context::new())?, "globals");
    let ctx = Context::new().with("site", "context");
    assert_eq!(template.render_to_string(&ctx)?, "context");
    Ok(())
}

#[test]
fn test_context_from_hashmap() -> Result<(), Error> {
    let ctx = Context::from(hashmap! {
        "items".to_string() => Value::list(vec![Value::Int(1), Value::Int(2)]),
        "sep".to_string() => Value::from("+"),
    });
    let env = Environment::builder().extension(TryCatchExtension).build();
    let out = env
        .from_string("{% try %}{{ items | join(sep) }}{% endtry %}")?
        .render_to_string(&ctx)?;
    assert_eq!(out, "1+2");
    Ok(())
}

#[test]
fn test_context_from_json() -> anyhow::Result<()> {
    let ctx = Context::from_json(serde_json::json!({
        "user": {"name": "Ada", "langs": ["en", "fr"]},
    }));
    assert!(ctx.get("user").is_some());

    let env = Environment::builder().extension(TryCatchExtension).build();
    let template = env.from_string(
        "{% try %}{{ user.name }}: {{ user.langs | join(', ') }}{% catch %}-{% endtry %}",
    )?;
    assert_eq!(template.render_to_string(&ctx)?, "Ada: en, fr");

    assert!(Context::from_json(serde_json::json!([1, 2])).get("0").is_none());
    Ok(())
}

#[test]
fn test_one_source_in_two_environments() -> anyhow::Result<()> {
    let source = "{% try %}{{ 6 * 7 }}{% catch %}no{% endtry %}";
    let text = Environment::builder().extension(TryCatchExtension).build();
    let native = Environment::builder()
        .extension(TryCatchExtension)
        .native(true)
        .build();

    assert_eq!(text.from_string(source)?.render(&Context::new())?, Value::from("42"));
    assert_eq!(native.from_string(source)?.render(&Context::new())?, Value::Int(42));
    Ok(())
}

#[test]
fn test_trim_blocks_option() -> anyhow::Result<()> {
    let env = Environment::builder()
        .extension(TryCatchExtension)
        .trim_blocks(true)
        .build();
    let out = env
        .from_string("{% try %}\nbody\n{% endtry %}\n")?
        .render_to_string(&Context::new())?;
    assert_eq!(out, "body\n");
    Ok(())
}
