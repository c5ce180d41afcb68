//! SQL text for change fetches.

use erpsync_core::EntityDescriptor;

/// Quote a MySQL identifier with backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// The keyset query for one entity.
///
/// Binds, in order: watermark time, watermark time, watermark key, limit.
pub fn change_query(entity: &EntityDescriptor) -> String {
    let table = quote_ident(&entity.source_table);
    let time = quote_ident(&entity.time_column);
    let key = quote_ident(&entity.key_column);

    format!(
        "SELECT * FROM {table} \
         WHERE {time} > ? OR ({time} = ? AND {key} > ?) \
         ORDER BY {time} ASC, {key} ASC \
         LIMIT ?"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_query_for_invoice_items() {
        let entity = EntityDescriptor::invoice_item().unwrap();
        assert_eq!(
            change_query(&entity),
            "SELECT * FROM `tabSales Invoice Item` \
             WHERE `modified` > ? OR (`modified` = ? AND `name` > ?) \
             ORDER BY `modified` ASC, `name` ASC \
             LIMIT ?"
        );
    }

    #[test]
    fn test_quote_ident_escapes_backticks() {
        assert_eq!(quote_ident("tabItem"), "`tabItem`");
        assert_eq!(quote_ident("a`b"), "`a``b`");
    }
}
