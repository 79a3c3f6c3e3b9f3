use std::collections::BTreeMap;

use libid_core::identify::IdentificationState;
use libid_core::patterns::AliasTable;
use libid_core::services::session::{
    AnalysisSession, FunctionEntry, SessionEngine, SessionError,
};

#[derive(Default)]
struct FakeDatabase {
    applied: Vec<String>,
    functions: BTreeMap<u64, FunctionEntry>,
}

impl FakeDatabase {
    fn with_functions(names: &[(u64, &str, bool)]) -> Self {
        let functions = names
            .iter()
            .map(|&(address, name, is_library)| {
                (address, FunctionEntry { address, name: name.to_string(), is_library })
            })
            .collect();
        Self { functions, ..Default::default() }
    }
}

impl SessionEngine for FakeDatabase {
    fn applied_signatures(&self) -> Result<Vec<String>, SessionError> {
        Ok(self.applied.clone())
    }

    fn apply_signature(&mut self, candidate: &str) -> Result<(), SessionError> {
        self.applied.push(candidate.to_string());
        Ok(())
    }

    fn functions(&self) -> Result<Vec<FunctionEntry>, SessionError> {
        Ok(self.functions.values().cloned().collect())
    }

    fn address_of(&self, name: &str) -> Result<Option<u64>, SessionError> {
        Ok(self.functions.values().find(|f| f.name == name).map(|f| f.address))
    }

    fn rename_function(&mut self, address: u64, name: &str) -> Result<(), SessionError> {
        let function = self
            .functions
            .get_mut(&address)
            .ok_or_else(|| SessionError::Engine(format!("no function at {address:#x}")))?;
        function.name = name.to_string();
        Ok(())
    }

    fn mark_library(&mut self, address: u64) -> Result<(), SessionError> {
        if let Some(function) = self.functions.get_mut(&address) {
            function.is_library = true;
        }
        Ok(())
    }
}

fn identified() -> IdentificationState {
    IdentificationState::from_json(
        r#"{"result": {"libc": "_libc_musl-1.2", "libgcc": "_libgcc_9.3"}}"#,
    )
    .unwrap()
}

#[test]
fn initialize_applies_and_normalizes_once() {
    let aliases = AliasTable::parse("memcpy,__memcpy\nexit,_exit,__exit\n");
    let mut session = AnalysisSession::new(aliases);
    let mut db = FakeDatabase::with_functions(&[
        (0x1000, "__memcpy", false),
        (0x2000, "_exit", false),
        (0x2100, "exit", true),
        (0x3000, "main", false),
    ]);
    db.applied.push("_libgcc_9.3".into());

    let report = session.initialize(&identified(), &mut db).unwrap().expect("first run");
    assert_eq!(report.applied, vec!["_libc_musl-1.2"]);
    assert_eq!(db.applied, vec!["_libgcc_9.3", "_libc_musl-1.2"]);

    assert_eq!(db.functions[&0x1000].name, "memcpy");
    // canonical name already taken: keep the alias, still flag as library code
    assert_eq!(db.functions[&0x2000].name, "_exit");
    assert!(db.functions[&0x2000].is_library);
    assert_eq!(report.renamed, 1);
    assert_eq!(report.marked, 2);
    assert!(!db.functions[&0x3000].is_library);

    assert!(session.initialize(&identified(), &mut db).unwrap().is_none());
    assert_eq!(db.applied.len(), 2);
}

#[test]
fn no_match_applies_nothing() {
    let state = IdentificationState::from_json(r#"{"result": {"libc": null}}"#).unwrap();
    let mut session = AnalysisSession::new(AliasTable::default());
    let mut db = FakeDatabase::default();
    let report = session.initialize(&state, &mut db).unwrap().unwrap();
    assert!(report.applied.is_empty());
    assert!(db.applied.is_empty());
}
