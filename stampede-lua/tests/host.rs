use stampede_lua::{ScriptHost, Value};

#[test]
fn set_then_eval_sees_the_binding() -> anyhow::Result<()> {
    let host = ScriptHost::new()?;
    host.set("a", &Value::Int(2))?;

    let result = host.eval("a + 3")?;
    assert_eq!(result, Value::Int(5));
    Ok(())
}

#[test]
fn statements_accumulate_state_across_evals() -> anyhow::Result<()> {
    let host = ScriptHost::new()?;

    host.eval("total = (total or 0) + 5")?;
    host.eval("total = (total or 0) + 5")?;

    assert_eq!(host.get("total")?, Value::Int(10));
    Ok(())
}

#[test]
fn expressions_return_values_statements_return_nil() -> anyhow::Result<()> {
    let host = ScriptHost::new()?;

    assert_eq!(host.eval("1 + 1")?, Value::Int(2));
    assert_eq!(host.eval("'a' .. 'b'")?, Value::String("ab".to_string()));
    assert_eq!(host.eval("x = 7")?, Value::Null);
    assert_eq!(host.get("x")?, Value::Int(7));
    Ok(())
}

#[test]
fn eval_error_surfaces_as_lua_error() -> anyhow::Result<()> {
    let host = ScriptHost::new()?;

    let err = host.eval("this is not lua").unwrap_err();
    assert!(err.to_string().contains("lua error"), "got: {err}");
    Ok(())
}

#[test]
fn fork_copies_bindings_but_not_future_mutations() -> anyhow::Result<()> {
    let host = ScriptHost::new()?;
    host.set("x", &Value::Int(1))?;

    let fork = host.fork()?;
    fork.eval("x = x + 1")?;

    assert_eq!(fork.get("x")?, Value::Int(2));
    assert_eq!(host.get("x")?, Value::Int(1));

    // Writes on the parent after the fork stay invisible to the fork.
    host.set("y", &Value::Int(9))?;
    assert_eq!(fork.get("y")?, Value::Null);
    Ok(())
}

#[test]
fn fork_deep_copies_tables() -> anyhow::Result<()> {
    let host = ScriptHost::new()?;
    host.eval("cfg = { retries = 1 }")?;

    let fork = host.fork()?;
    fork.eval("cfg.retries = 99")?;

    assert_eq!(host.eval("cfg.retries")?, Value::Int(1));
    assert_eq!(fork.eval("cfg.retries")?, Value::Int(99));
    Ok(())
}

#[test]
fn forks_of_forks_keep_the_chain_of_bindings() -> anyhow::Result<()> {
    let host = ScriptHost::new()?;
    host.set("base", &Value::String("http://localhost".to_string()))?;

    let worker = host.fork()?;
    worker.set("counter", &Value::Int(3))?;

    let inner = worker.fork()?;
    assert_eq!(
        inner.get("base")?,
        Value::String("http://localhost".to_string())
    );
    assert_eq!(inner.get("counter")?, Value::Int(3));
    Ok(())
}

#[test]
fn response_style_object_is_scriptable() -> anyhow::Result<()> {
    let host = ScriptHost::new()?;

    let mut header = std::collections::BTreeMap::new();
    header.insert(
        "Content-Type".to_string(),
        Value::String("text/plain".to_string()),
    );

    let mut response = std::collections::BTreeMap::new();
    response.insert("status".to_string(), Value::String("200 OK".to_string()));
    response.insert("statuscode".to_string(), Value::Int(200));
    response.insert("header".to_string(), Value::Object(header));

    host.set("response", &Value::Object(response))?;

    assert_eq!(host.eval("response.statuscode == 200")?, Value::Bool(true));
    assert_eq!(
        host.eval("response.header['Content-Type']")?,
        Value::String("text/plain".to_string())
    );
    assert_eq!(host.eval("response.status")?, Value::String("200 OK".to_string()));
    Ok(())
}
