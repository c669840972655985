use redb::TableDefinition;

/// Origin-scoped key-value entries: key -> serialized envelope (JSON text)
pub const KV: TableDefinition<&str, &str> = TableDefinition::new("kv");
