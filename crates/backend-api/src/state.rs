use membank_database::{DataSource, MemberRepository};

#[derive(Clone)]
pub struct AppState {
    members: MemberRepository,
}

impl AppState {
    pub fn new(members: MemberRepository) -> Self {
        Self { members }
    }

    /// Builds the repository over `source`.
    pub fn from_source(source: DataSource) -> Self {
        Self::new(MemberRepository::new(source))
    }

    pub fn members(&self) -> &MemberRepository {
        &self.members
    }

    pub fn data_source(&self) -> &DataSource {
        self.members.source()
    }
}
