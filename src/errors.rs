use std::fmt::Display;

#[derive(Debug)]
pub enum EvertickError {
    BuildErrorNoTimerSet,
    ReactorStopped,
}

impl Display for EvertickError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvertickError::BuildErrorNoTimerSet => {
                write!(f, "Dispatcher build error : no timer handle set !")
            }
            EvertickError::ReactorStopped => {
                write!(f, "Timer reactor is stopped, a wait cannot be armed")
            }
        }
    }
}
